//! Post payloads and the in-flight pipeline record.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use validator::{Validate, ValidationError};

use crate::features::{AudioFeatures, HookFeatures, ShootingStyle, StyleFeatures};

/// Unique identifier of a short-form post on the source platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct PostId(pub String);

impl PostId {
    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PostId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PostId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Errors raised while turning a raw request body into payloads.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Expected a JSON object or an array of objects, got {0}")]
    NotObjectOrArray(&'static str),

    #[error("Invalid post payload at index {index}: {message}")]
    Invalid { index: usize, message: String },
}

/// Engagement counters as reported by the source platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EngagementCounters {
    /// Likes
    #[serde(default)]
    pub digg_count: u64,
    #[serde(default)]
    pub comment_count: u64,
    #[serde(default)]
    pub share_count: u64,
    /// Views
    #[serde(default)]
    pub play_count: u64,
}

/// How the post was discovered by the upstream scraper.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DiscoveryInput {
    #[serde(default)]
    pub search_keyword: String,
    #[serde(default)]
    pub what_to_collect: String,
    #[serde(default)]
    pub country: String,
}

/// One incoming post as submitted to the ingestion entry point.
///
/// Only the fields the pipeline reads are typed; everything else is kept in
/// `extra` so the stored snapshot stays complete.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct PostPayload {
    #[validate(custom(function = "validate_post_id"))]
    pub post_id: String,

    #[validate(url)]
    pub url: String,

    #[serde(default)]
    pub description: String,

    #[serde(deserialize_with = "deserialize_create_time")]
    #[schemars(with = "String")]
    pub create_time: DateTime<Utc>,

    #[serde(flatten)]
    pub engagement: EngagementCounters,

    #[serde(default)]
    pub discovery_input: Option<DiscoveryInput>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PostPayload {
    /// Parse a request body that holds either one payload or a list of them.
    pub fn parse_many(body: Value) -> Result<Vec<PostPayload>, PayloadError> {
        let items = match body {
            Value::Array(items) => items,
            obj @ Value::Object(_) => vec![obj],
            Value::Null => return Err(PayloadError::NotObjectOrArray("null")),
            Value::Bool(_) => return Err(PayloadError::NotObjectOrArray("a boolean")),
            Value::Number(_) => return Err(PayloadError::NotObjectOrArray("a number")),
            Value::String(_) => return Err(PayloadError::NotObjectOrArray("a string")),
        };

        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                let payload: PostPayload =
                    serde_json::from_value(item).map_err(|e| PayloadError::Invalid {
                        index,
                        message: e.to_string(),
                    })?;
                payload.validate().map_err(|e| PayloadError::Invalid {
                    index,
                    message: e.to_string(),
                })?;
                Ok(payload)
            })
            .collect()
    }
}

/// Whether `id` is usable as a post id.
///
/// Ids end up in object keys and local file names, so only ASCII letters,
/// digits, `_` and `-` are allowed.
pub fn is_valid_post_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

fn validate_post_id(id: &str) -> Result<(), ValidationError> {
    if is_valid_post_id(id) {
        Ok(())
    } else {
        let mut err = ValidationError::new("post_id");
        err.message = Some("post_id may only contain ASCII letters, digits, '_' and '-'".into());
        Err(err)
    }
}

/// Accepts RFC 3339 strings or unix epoch seconds.
fn deserialize_create_time<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Epoch(i64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Text(s) => {
            if let Ok(secs) = s.parse::<i64>() {
                return Utc
                    .timestamp_opt(secs, 0)
                    .single()
                    .ok_or_else(|| serde::de::Error::custom("create_time out of range"));
            }
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(serde::de::Error::custom)
        }
        Raw::Epoch(secs) => Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| serde::de::Error::custom("create_time out of range")),
    }
}

/// A post moving through the ingestion pipeline.
///
/// Stages take the record by value and hand back an updated copy; derived
/// fields stay `None` when the stage that owns them failed.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PostRecord {
    pub post_id: PostId,
    pub url: String,
    pub description: String,
    pub search_term: Option<String>,
    #[serde(flatten)]
    pub engagement: EngagementCounters,
    pub create_time: DateTime<Utc>,

    /// Durable storage reference (`s3://bucket/key`)
    pub video_link: Option<String>,
    pub local_video_path: Option<PathBuf>,
    pub local_audio_path: Option<PathBuf>,
    pub local_speech_path: Option<PathBuf>,

    pub transcript: Option<String>,
    pub impact_score: Option<f64>,
    pub hook: Option<HookFeatures>,
    /// Structured visual features as returned by the content service
    pub visual: Option<Value>,
    pub style: Option<StyleFeatures>,
    pub audio: Option<AudioFeatures>,
    pub shooting_style: Option<ShootingStyle>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PostRecord {
    /// Build a fresh record from a validated payload.
    pub fn from_payload(payload: PostPayload) -> Self {
        let search_term = payload
            .discovery_input
            .as_ref()
            .map(|d| d.search_keyword.trim().to_string())
            .filter(|s| !s.is_empty());

        Self {
            post_id: PostId(payload.post_id),
            url: payload.url,
            description: payload.description,
            search_term,
            engagement: payload.engagement,
            create_time: payload.create_time,
            video_link: None,
            local_video_path: None,
            local_audio_path: None,
            local_speech_path: None,
            transcript: None,
            impact_score: None,
            hook: None,
            visual: None,
            style: None,
            audio: None,
            shooting_style: None,
            extra: payload.extra,
        }
    }

    /// Local files currently owned by this record.
    pub fn local_artifacts(&self) -> impl Iterator<Item = &Path> {
        [
            self.local_video_path.as_deref(),
            self.local_audio_path.as_deref(),
            self.local_speech_path.as_deref(),
        ]
        .into_iter()
        .flatten()
    }

    /// Whether the creator was judged to be speaking on camera.
    pub fn creator_speaking(&self) -> bool {
        self.style.as_ref().map(|s| s.creator_speaking).unwrap_or(false)
    }
}
