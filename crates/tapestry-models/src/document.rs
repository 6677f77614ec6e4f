//! Search document projected from a finished record.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::post::PostRecord;

/// Terminal projection of a `PostRecord`, as stored in the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VectorDocument {
    pub post_id: String,
    pub url: String,
    pub description: String,
    pub impact_score: f64,
    pub search_term: String,
    /// Empty unless the creator speaks on camera
    pub transcript: String,
    pub text_elements: String,
    pub shooting_style: String,
    /// Serialized snapshot of the full record
    pub object: String,
}

impl VectorDocument {
    /// Project a record into its index document.
    pub fn from_record(record: &PostRecord) -> Result<Self, serde_json::Error> {
        let transcript = if record.creator_speaking() {
            record.transcript.clone().unwrap_or_default()
        } else {
            String::new()
        };

        Ok(Self {
            post_id: record.post_id.to_string(),
            url: record.url.clone(),
            description: record.description.clone(),
            impact_score: record.impact_score.unwrap_or(0.0),
            search_term: record.search_term.clone().unwrap_or_default(),
            transcript,
            text_elements: text_elements(record),
            shooting_style: record
                .shooting_style
                .map(|s| s.as_str().to_string())
                .unwrap_or_default(),
            object: serde_json::to_string(record)?,
        })
    }
}

/// On-screen text: the visual features' `text_elements`, else the screen hook.
fn text_elements(record: &PostRecord) -> String {
    let from_visual = record
        .visual
        .as_ref()
        .and_then(|v| v.get("text_elements"))
        .and_then(|v| match v {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Array(items) => Some(
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.trim().to_string(),
                        other => other.to_string(),
                    })
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
                    .join("; "),
            ),
            Value::Null => None,
            other => Some(other.to_string()),
        })
        .filter(|s| !s.is_empty());

    from_visual
        .or_else(|| record.hook.as_ref().and_then(|h| h.screen_hook.clone()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{CreatorVisibility, HookFeatures, ShootingStyle, StyleFeatures};
    use crate::post::PostPayload;
    use serde_json::json;

    fn record() -> PostRecord {
        let payload = PostPayload::parse_many(json!({
            "post_id": "42",
            "url": "https://www.tiktok.com/@a/video/42",
            "description": "desc",
            "create_time": "2024-01-01T00:00:00Z",
            "discovery_input": {"search_keyword": "lipstick"}
        }))
        .unwrap()
        .remove(0);
        PostRecord {
            transcript: Some("Hello there. Buy this.".into()),
            impact_score: Some(12.5),
            ..PostRecord::from_payload(payload)
        }
    }

    fn speaking(speaking: bool) -> StyleFeatures {
        StyleFeatures {
            creator_visible: CreatorVisibility::FaceVisible,
            product_visible: true,
            creator_speaking: speaking,
        }
    }

    #[test]
    fn test_transcript_only_when_speaking() {
        let silent = PostRecord {
            style: Some(speaking(false)),
            ..record()
        };
        assert_eq!(VectorDocument::from_record(&silent).unwrap().transcript, "");

        let talking = PostRecord {
            style: Some(speaking(true)),
            ..record()
        };
        assert_eq!(
            VectorDocument::from_record(&talking).unwrap().transcript,
            "Hello there. Buy this."
        );
    }

    #[test]
    fn test_text_elements_from_visual_array() {
        let rec = PostRecord {
            visual: Some(json!({"text_elements": ["50% OFF", " link in bio "]})),
            ..record()
        };
        assert_eq!(
            VectorDocument::from_record(&rec).unwrap().text_elements,
            "50% OFF; link in bio"
        );
    }

    #[test]
    fn test_text_elements_falls_back_to_screen_hook() {
        let rec = PostRecord {
            hook: Some(HookFeatures {
                screen_hook: Some("Wait for it".into()),
                ..Default::default()
            }),
            ..record()
        };
        assert_eq!(VectorDocument::from_record(&rec).unwrap().text_elements, "Wait for it");
    }

    #[test]
    fn test_projection_fields() {
        let rec = PostRecord {
            shooting_style: Some(ShootingStyle::TalkingHead),
            ..record()
        };
        let doc = VectorDocument::from_record(&rec).unwrap();

        assert_eq!(doc.post_id, "42");
        assert_eq!(doc.search_term, "lipstick");
        assert_eq!(doc.shooting_style, "talking-head");
        assert_eq!(doc.impact_score, 12.5);

        let snapshot: Value = serde_json::from_str(&doc.object).unwrap();
        assert_eq!(snapshot["post_id"], "42");
    }
}
