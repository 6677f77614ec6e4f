//! Typed feature generators on top of a [`ContentGenerator`].

use std::sync::Arc;

use serde_json::{json, Value};
use tapestry_media::{Frame, KeyframeWindow};
use tapestry_models::{
    CreatorVisibility, HookAnalysis, HookFeatures, ShootingStyle, StyleFeatures,
};
use tracing::{debug, warn};

use crate::client::{ContentBlock, ContentGenerator, ModelTier};
use crate::error::{ContentError, ContentResult};
use crate::prompts::{self, PromptLibrary};

/// Replacement for a `NO HOOK` reply.
pub const NO_HOOK_TEXT: &str = "No caption text detected on screen.";
/// Longest visual style summary, in words.
pub const VISUAL_STYLE_MAX_WORDS: usize = 15;
/// Longest transcript excerpt sent with the hook analysis, in characters.
pub const HOOK_TRANSCRIPT_MAX_CHARS: usize = 500;
/// Keyframes per style classification request.
pub const STYLE_CHUNK_SIZE: usize = 5;

/// A keyframe with the speech heard in its window.
#[derive(Debug, Clone)]
pub struct KeyframeMoment {
    pub keyframe: KeyframeWindow,
    pub transcript: String,
}

/// Builds post features from frames and transcripts.
#[derive(Clone)]
pub struct FeatureGenerator {
    generator: Arc<dyn ContentGenerator>,
    prompts: PromptLibrary,
}

impl FeatureGenerator {
    pub fn new(generator: Arc<dyn ContentGenerator>, prompts: PromptLibrary) -> Self {
        Self { generator, prompts }
    }

    /// Caption text on screen.
    pub async fn screen_hook(&self, frame: &Frame) -> ContentResult<String> {
        let content = vec![
            ContentBlock::text(self.prompts.get(prompts::SCREEN_HOOK)),
            ContentBlock::frame(frame)?,
        ];
        let text = self.generator.generate_text(ModelTier::Base, content).await?;
        let text = text.trim();

        if text == "NO HOOK" {
            Ok(NO_HOOK_TEXT.to_string())
        } else {
            Ok(text.to_string())
        }
    }

    /// Short description of what the creator is doing.
    pub async fn visual_style_summary(&self, frame: &Frame) -> ContentResult<String> {
        let content = vec![
            ContentBlock::text(self.prompts.get(prompts::VISUAL_STYLE)),
            ContentBlock::frame(frame)?,
        ];
        let text = self.generator.generate_text(ModelTier::Base, content).await?;
        Ok(truncate_words(&text, VISUAL_STYLE_MAX_WORDS))
    }

    pub async fn hook_analysis(&self, frame: &Frame, transcript: &str) -> ContentResult<HookAnalysis> {
        let excerpt = truncate_chars(transcript, HOOK_TRANSCRIPT_MAX_CHARS);
        let content = vec![
            ContentBlock::text(
                self.prompts
                    .render_with_transcript(prompts::HOOK_ANALYSIS, &excerpt),
            ),
            ContentBlock::frame(frame)?,
        ];
        let text = self.generator.generate_text(ModelTier::Base, content).await?;
        Ok(HookAnalysis::parse(&text))
    }

    /// Hook features from the hook frame and transcript.
    ///
    /// Each part is independent: a failed call leaves its field empty.
    pub async fn hook_features(&self, frame: Option<&Frame>, transcript: Option<&str>) -> HookFeatures {
        let transcript = transcript.unwrap_or_default();
        let mut hook = HookFeatures {
            audio_hook: audio_hook(transcript),
            ..HookFeatures::default()
        };

        let Some(frame) = frame else {
            return hook;
        };

        hook.screen_hook = self
            .screen_hook(frame)
            .await
            .map_err(|e| warn!("Screen hook extraction failed: {}", e))
            .ok();
        hook.visual_style_summary = self
            .visual_style_summary(frame)
            .await
            .map_err(|e| warn!("Visual style summary failed: {}", e))
            .ok();
        hook.analysis = self
            .hook_analysis(frame, transcript)
            .await
            .map_err(|e| warn!("Hook analysis failed: {}", e))
            .ok();

        hook
    }

    /// Structured visual description of the opening keyframes.
    pub async fn visual_features(&self, keyframes: &[KeyframeWindow]) -> ContentResult<Value> {
        if keyframes.is_empty() {
            return Err(ContentError::missing_input("no keyframes"));
        }

        let mut content = Vec::with_capacity(1 + keyframes.len() * 2);
        content.push(ContentBlock::text(self.prompts.get(prompts::VISUAL_FEATURES)));
        for keyframe in keyframes {
            content.push(ContentBlock::text(format!(
                "\n=== Moment {} ===\n",
                keyframe.frame_number
            )));
            content.push(ContentBlock::frame(&keyframe.image)?);
        }

        self.generator.generate_json(ModelTier::Vision, content).await
    }

    /// Creator and product presence across all keyframes.
    ///
    /// Keyframes are sent in chunks and the flags OR-ed, stopping early once
    /// both a face and a product have been seen. Any failed chunk fails the
    /// whole call.
    pub async fn style_features(&self, keyframes: &[KeyframeWindow]) -> ContentResult<StyleFeatures> {
        let mut flags = StyleFlags::default();

        for (index, chunk) in keyframes.chunks(STYLE_CHUNK_SIZE).enumerate() {
            let mut content = Vec::with_capacity(1 + chunk.len());
            content.push(ContentBlock::text(self.prompts.get(prompts::STYLE_FEATURES)));
            for keyframe in chunk {
                content.push(ContentBlock::frame(&keyframe.image)?);
            }

            let reply = self.generator.generate_json(ModelTier::Style, content).await?;
            flags.merge(&reply);
            debug!(chunk = index, ?flags, "Style chunk classified");

            if flags.face && flags.product {
                break;
            }
        }

        Ok(flags.into_features())
    }

    /// Shooting style label, falling back to [`heuristic_shooting_style`]
    /// when the service gives no usable answer.
    pub async fn shooting_style(
        &self,
        style: Option<&StyleFeatures>,
        hook: Option<&HookFeatures>,
        visual: Option<&Value>,
        transcript: Option<&str>,
    ) -> ShootingStyle {
        let has_speech = transcript.is_some_and(|t| !t.trim().is_empty());
        let fallback = heuristic_shooting_style(style, has_speech);

        if style.is_none() && hook.is_none() && visual.is_none() {
            return fallback;
        }

        let observations = json!({
            "style": style,
            "hook": hook,
            "visual": visual,
            "has_speech": has_speech,
        });
        let content = vec![
            ContentBlock::text(self.prompts.get(prompts::SHOOTING_STYLE)),
            ContentBlock::text(observations.to_string()),
        ];

        match self.generator.generate_json(ModelTier::Base, content).await {
            Ok(reply) => match reply
                .get("shooting_style")
                .and_then(Value::as_str)
                .map(str::parse::<ShootingStyle>)
            {
                Some(Ok(label)) => label,
                _ => {
                    warn!(reply = %reply, "Unrecognized shooting style, using heuristic");
                    fallback
                }
            },
            Err(e) => {
                warn!("Shooting style classification failed, using heuristic: {}", e);
                fallback
            }
        }
    }

    /// Narrative summary of a whole video from its annotated keyframes.
    ///
    /// Returns the reply's `summary` value.
    pub async fn summary(&self, moments: &[KeyframeMoment], caption: &str) -> ContentResult<Value> {
        if moments.is_empty() {
            return Err(ContentError::missing_input("no keyframes"));
        }

        let mut content = Vec::with_capacity(1 + moments.len() * 3);
        content.push(ContentBlock::text(
            self.prompts.render_with_caption(prompts::SUMMARY, caption),
        ));
        for moment in moments {
            let keyframe = &moment.keyframe;
            content.push(ContentBlock::text(format!(
                "\n=== Moment {} ===\nTimestamp: {:.2} seconds\n",
                keyframe.frame_number, keyframe.timestamp
            )));
            content.push(ContentBlock::frame(&keyframe.image)?);
            content.push(ContentBlock::text(format!(
                "\nAudio from {:.2}s to {:.2}s:\n{}\n-------------------",
                keyframe.window_start, keyframe.window_end, moment.transcript
            )));
        }

        let reply = self.generator.generate_json(ModelTier::Vision, content).await?;
        match reply.get("summary") {
            Some(summary) if !summary.is_null() => Ok(summary.clone()),
            _ => Err(ContentError::malformed("reply has no summary")),
        }
    }

    /// Shootable screenplay from a summary and the complete transcript.
    ///
    /// Returns the reply's `screenplay` value.
    pub async fn screenplay(&self, summary: &Value, transcript: &str) -> ContentResult<Value> {
        let analysis = serde_json::to_string_pretty(summary)?;
        let content = vec![
            ContentBlock::text(self.prompts.get(prompts::SCREENPLAY)),
            ContentBlock::text(format!(
                "\n=== Video Analysis ===\n{}\n\n=== Complete Transcript ===\n{}\n",
                analysis, transcript
            )),
        ];

        let reply = self.generator.generate_json(ModelTier::Base, content).await?;
        match reply.get("screenplay") {
            Some(screenplay) if !screenplay.is_null() => Ok(screenplay.clone()),
            _ => Err(ContentError::malformed("reply has no screenplay")),
        }
    }

    /// Free-text edit recommendations for a low performer.
    pub async fn suggest_edits(&self, comparison: &Value) -> ContentResult<String> {
        let content = vec![
            ContentBlock::text(self.prompts.get(prompts::EDIT_RECOMMENDATIONS)),
            ContentBlock::text(comparison.to_string()),
        ];
        let text = self.generator.generate_text(ModelTier::Vision, content).await?;
        Ok(text.trim().to_string())
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct StyleFlags {
    face: bool,
    hand: bool,
    product: bool,
    speaking: bool,
}

impl StyleFlags {
    fn merge(&mut self, reply: &Value) {
        let flag = |key: &str| reply.get(key).and_then(Value::as_bool).unwrap_or(false);
        self.face |= flag("face_visible");
        self.hand |= flag("hand_visible");
        self.product |= flag("product_visible");
        self.speaking |= flag("creator_speaking");
    }

    fn into_features(self) -> StyleFeatures {
        let creator_visible = if self.face {
            CreatorVisibility::FaceVisible
        } else if self.hand {
            CreatorVisibility::OnlyHands
        } else {
            CreatorVisibility::No
        };

        StyleFeatures {
            creator_visible,
            product_visible: self.product,
            creator_speaking: self.speaking,
        }
    }
}

/// Deterministic label from the style flags alone.
pub fn heuristic_shooting_style(style: Option<&StyleFeatures>, has_speech: bool) -> ShootingStyle {
    let Some(style) = style else {
        return ShootingStyle::Other;
    };

    match style.creator_visible {
        CreatorVisibility::FaceVisible if style.creator_speaking => ShootingStyle::TalkingHead,
        CreatorVisibility::OnlyHands => ShootingStyle::HandsOnly,
        _ if style.product_visible => ShootingStyle::ProductShowcase,
        _ if has_speech => ShootingStyle::Voiceover,
        _ => ShootingStyle::Vibes,
    }
}

/// First sentence of a transcript.
///
/// Returns `None` for an empty transcript or one carrying an error marker.
pub fn audio_hook(transcript: &str) -> Option<String> {
    let transcript = transcript.trim();
    if transcript.is_empty() || transcript.starts_with("Error:") {
        return None;
    }

    let mut chars = transcript.char_indices().peekable();
    while let Some((at, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some((_, next)) = chars.peek() {
                if next.is_whitespace() {
                    return Some(transcript[..at + c.len_utf8()].to_string());
                }
            }
        }
    }

    Some(transcript.to_string())
}

fn truncate_words(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((at, _)) => format!("{}...", &text[..at]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays canned replies and records every request.
    #[derive(Default)]
    struct ScriptedGenerator {
        text_replies: Mutex<Vec<ContentResult<String>>>,
        json_replies: Mutex<Vec<ContentResult<Value>>>,
        requests: Mutex<Vec<(ModelTier, Vec<ContentBlock>)>>,
    }

    impl ScriptedGenerator {
        fn with_text(replies: Vec<ContentResult<String>>) -> Self {
            Self {
                text_replies: Mutex::new(replies.into_iter().rev().collect()),
                ..Self::default()
            }
        }

        fn with_json(replies: Vec<ContentResult<Value>>) -> Self {
            Self {
                json_replies: Mutex::new(replies.into_iter().rev().collect()),
                ..Self::default()
            }
        }

        fn requests(&self) -> Vec<(ModelTier, Vec<ContentBlock>)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ContentGenerator for ScriptedGenerator {
        async fn generate_text(&self, tier: ModelTier, content: Vec<ContentBlock>) -> ContentResult<String> {
            self.requests.lock().unwrap().push((tier, content));
            self.text_replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(ContentError::malformed("script exhausted")))
        }

        async fn generate_json(&self, tier: ModelTier, content: Vec<ContentBlock>) -> ContentResult<Value> {
            self.requests.lock().unwrap().push((tier, content));
            self.json_replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(ContentError::malformed("script exhausted")))
        }
    }

    fn generator(scripted: &Arc<ScriptedGenerator>) -> FeatureGenerator {
        FeatureGenerator::new(scripted.clone(), PromptLibrary::builtin())
    }

    fn frame() -> Frame {
        Frame::filled(16, 16, [200, 40, 40])
    }

    fn keyframes(count: usize) -> Vec<KeyframeWindow> {
        (0..count)
            .map(|i| KeyframeWindow {
                frame_number: i + 1,
                timestamp: i as f64,
                image: frame(),
                window_start: i.saturating_sub(1) as f64,
                window_end: i as f64,
            })
            .collect()
    }

    fn text_of(block: &ContentBlock) -> &str {
        match block {
            ContentBlock::Text { text } => text,
            ContentBlock::Image { .. } => "",
        }
    }

    #[test]
    fn test_audio_hook_first_sentence() {
        assert_eq!(
            audio_hook("Stop scrolling! This serum changed my skin. Here's why."),
            Some("Stop scrolling!".to_string())
        );
        assert_eq!(
            audio_hook("Version 2.5 is out now. Try it."),
            Some("Version 2.5 is out now.".to_string())
        );
        assert_eq!(audio_hook("no punctuation at all"), Some("no punctuation at all".to_string()));
    }

    #[test]
    fn test_audio_hook_empty_or_error() {
        assert_eq!(audio_hook(""), None);
        assert_eq!(audio_hook("   "), None);
        assert_eq!(audio_hook("Error: transcription failed"), None);
    }

    #[test]
    fn test_truncation_helpers() {
        let long = "one two three four five six seven eight nine ten eleven twelve thirteen fourteen fifteen sixteen";
        assert_eq!(truncate_words(long, 15).split(' ').count(), 15);
        assert_eq!(truncate_words("a  b", 15), "a b");

        let transcript = "x".repeat(600);
        let excerpt = truncate_chars(&transcript, 500);
        assert_eq!(excerpt.len(), 503);
        assert!(excerpt.ends_with("..."));
        assert_eq!(truncate_chars("short", 500), "short");
    }

    #[test]
    fn test_heuristic_shooting_style() {
        let style = |creator_visible, product_visible, creator_speaking| StyleFeatures {
            creator_visible,
            product_visible,
            creator_speaking,
        };

        assert_eq!(heuristic_shooting_style(None, true), ShootingStyle::Other);
        assert_eq!(
            heuristic_shooting_style(Some(&style(CreatorVisibility::FaceVisible, true, true)), true),
            ShootingStyle::TalkingHead
        );
        assert_eq!(
            heuristic_shooting_style(Some(&style(CreatorVisibility::OnlyHands, true, false)), false),
            ShootingStyle::HandsOnly
        );
        assert_eq!(
            heuristic_shooting_style(Some(&style(CreatorVisibility::No, true, false)), true),
            ShootingStyle::ProductShowcase
        );
        assert_eq!(
            heuristic_shooting_style(Some(&style(CreatorVisibility::No, false, false)), true),
            ShootingStyle::Voiceover
        );
        assert_eq!(
            heuristic_shooting_style(Some(&style(CreatorVisibility::FaceVisible, false, false)), false),
            ShootingStyle::Vibes
        );
    }

    #[tokio::test]
    async fn test_screen_hook_no_hook() {
        let scripted = Arc::new(ScriptedGenerator::with_text(vec![Ok("NO HOOK".into())]));
        let hook = generator(&scripted).screen_hook(&frame()).await.unwrap();
        assert_eq!(hook, NO_HOOK_TEXT);

        let requests = scripted.requests();
        assert_eq!(requests[0].0, ModelTier::Base);
        assert!(matches!(requests[0].1[1], ContentBlock::Image { .. }));
    }

    #[tokio::test]
    async fn test_hook_features_tolerates_partial_failure() {
        let scripted = Arc::new(ScriptedGenerator::with_text(vec![
            Ok("3 mistakes everyone makes".into()),
            Err(ContentError::Service {
                status: 500,
                message: "boom".into(),
            }),
            Ok("VISUAL_STYLE: selfie\nAUDIO_STYLE: upbeat".into()),
        ]));

        let hook = generator(&scripted)
            .hook_features(Some(&frame()), Some("First line. Second line."))
            .await;

        assert_eq!(hook.screen_hook.as_deref(), Some("3 mistakes everyone makes"));
        assert_eq!(hook.audio_hook.as_deref(), Some("First line."));
        assert!(hook.visual_style_summary.is_none());
        assert_eq!(
            hook.analysis,
            Some(HookAnalysis::Parsed {
                visual: "selfie".into(),
                audio: "upbeat".into(),
                instructions: String::new(),
            })
        );

        let requests = scripted.requests();
        assert!(text_of(&requests[2].1[0]).contains("Transcript: First line. Second line."));
    }

    #[tokio::test]
    async fn test_hook_features_without_frame() {
        let scripted = Arc::new(ScriptedGenerator::default());
        let hook = generator(&scripted).hook_features(None, Some("Hi there. Bye.")).await;

        assert_eq!(hook.audio_hook.as_deref(), Some("Hi there."));
        assert!(hook.screen_hook.is_none());
        assert!(scripted.requests().is_empty());
    }

    #[tokio::test]
    async fn test_visual_features_moment_headers() {
        let scripted = Arc::new(ScriptedGenerator::with_json(vec![Ok(
            json!({ "text_elements": "Bold caption" }),
        )]));

        let value = generator(&scripted)
            .visual_features(&keyframes(2))
            .await
            .unwrap();
        assert_eq!(value["text_elements"], "Bold caption");

        let requests = scripted.requests();
        let (tier, content) = &requests[0];
        assert_eq!(*tier, ModelTier::Vision);
        assert_eq!(content.len(), 5);
        assert_eq!(text_of(&content[1]), "\n=== Moment 1 ===\n");
        assert_eq!(text_of(&content[3]), "\n=== Moment 2 ===\n");
    }

    #[tokio::test]
    async fn test_style_features_merges_chunks_and_stops_early() {
        let scripted = Arc::new(ScriptedGenerator::with_json(vec![
            Ok(json!({ "face_visible": false, "hand_visible": true, "product_visible": true })),
            Ok(json!({ "face_visible": true, "hand_visible": false, "product_visible": false, "creator_speaking": true })),
            Ok(json!({ "face_visible": false })),
        ]));

        let features = generator(&scripted)
            .style_features(&keyframes(12))
            .await
            .unwrap();

        assert_eq!(
            features,
            StyleFeatures {
                creator_visible: CreatorVisibility::FaceVisible,
                product_visible: true,
                creator_speaking: true,
            }
        );

        let requests = scripted.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].0, ModelTier::Style);
        assert_eq!(requests[0].1.len(), 1 + STYLE_CHUNK_SIZE);
    }

    #[tokio::test]
    async fn test_style_features_hands_only() {
        let scripted = Arc::new(ScriptedGenerator::with_json(vec![Ok(
            json!({ "face_visible": false, "hand_visible": true, "product_visible": false }),
        )]));

        let features = generator(&scripted)
            .style_features(&keyframes(3))
            .await
            .unwrap();
        assert_eq!(features.creator_visible, CreatorVisibility::OnlyHands);
        assert!(!features.product_visible);
    }

    #[tokio::test]
    async fn test_style_features_chunk_failure_fails_call() {
        let scripted = Arc::new(ScriptedGenerator::with_json(vec![
            Ok(json!({ "hand_visible": true })),
            Err(ContentError::RetriesExhausted {
                attempts: 5,
                last: "rate limited".into(),
            }),
        ]));

        let result = generator(&scripted).style_features(&keyframes(7)).await;
        assert!(matches!(result, Err(ContentError::RetriesExhausted { .. })));
    }

    #[tokio::test]
    async fn test_shooting_style_from_reply() {
        let scripted = Arc::new(ScriptedGenerator::with_json(vec![Ok(
            json!({ "shooting_style": "hands_only" }),
        )]));
        let style = StyleFeatures {
            creator_visible: CreatorVisibility::FaceVisible,
            product_visible: false,
            creator_speaking: true,
        };

        let label = generator(&scripted)
            .shooting_style(Some(&style), None, None, Some("hello"))
            .await;
        assert_eq!(label, ShootingStyle::HandsOnly);
    }

    #[tokio::test]
    async fn test_shooting_style_falls_back_on_unknown_label() {
        let scripted = Arc::new(ScriptedGenerator::with_json(vec![Ok(
            json!({ "shooting_style": "cinematic" }),
        )]));
        let style = StyleFeatures {
            creator_visible: CreatorVisibility::FaceVisible,
            product_visible: false,
            creator_speaking: true,
        };

        let label = generator(&scripted)
            .shooting_style(Some(&style), None, None, None)
            .await;
        assert_eq!(label, ShootingStyle::TalkingHead);
    }

    #[tokio::test]
    async fn test_shooting_style_without_inputs_skips_call() {
        let scripted = Arc::new(ScriptedGenerator::default());
        let label = generator(&scripted)
            .shooting_style(None, None, None, Some("spoken words"))
            .await;

        assert_eq!(label, ShootingStyle::Other);
        assert!(scripted.requests().is_empty());
    }

    fn moments(count: usize) -> Vec<KeyframeMoment> {
        keyframes(count)
            .into_iter()
            .map(|keyframe| KeyframeMoment {
                transcript: format!("line {}", keyframe.frame_number),
                keyframe,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_summary_sends_each_moment_with_its_audio() {
        let scripted = Arc::new(ScriptedGenerator::with_json(vec![Ok(
            json!({ "summary": { "description": "a routine" } }),
        )]));

        let summary = generator(&scripted)
            .summary(&moments(2), "morning routine")
            .await
            .unwrap();
        assert_eq!(summary, json!({ "description": "a routine" }));

        let requests = scripted.requests();
        let (tier, content) = &requests[0];
        assert_eq!(*tier, ModelTier::Vision);
        assert_eq!(content.len(), 7);
        assert!(text_of(&content[0]).contains("morning routine"));
        assert_eq!(text_of(&content[1]), "\n=== Moment 1 ===\nTimestamp: 0.00 seconds\n");
        assert!(matches!(content[2], ContentBlock::Image { .. }));
        assert_eq!(
            text_of(&content[6]),
            "\nAudio from 0.00s to 1.00s:\nline 2\n-------------------"
        );
    }

    #[tokio::test]
    async fn test_summary_requires_keyframes_and_summary_key() {
        let scripted = Arc::new(ScriptedGenerator::with_json(vec![Ok(json!({ "other": 1 }))]));
        let generator = generator(&scripted);

        let err = generator.summary(&[], "").await.unwrap_err();
        assert!(matches!(err, ContentError::MissingInput(_)));
        assert!(scripted.requests().is_empty());

        let err = generator.summary(&moments(1), "").await.unwrap_err();
        assert!(matches!(err, ContentError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_screenplay_embeds_summary_and_transcript() {
        let scripted = Arc::new(ScriptedGenerator::with_json(vec![Ok(
            json!({ "screenplay": [{ "scene": 1 }] }),
        )]));

        let screenplay = generator(&scripted)
            .screenplay(&json!({ "description": "unboxing" }), "Look at this.")
            .await
            .unwrap();
        assert_eq!(screenplay, json!([{ "scene": 1 }]));

        let requests = scripted.requests();
        let body = text_of(&requests[0].1[1]);
        assert!(body.contains("=== Video Analysis ===\n{\n  \"description\": \"unboxing\"\n}"));
        assert!(body.contains("=== Complete Transcript ===\nLook at this."));
    }

    #[tokio::test]
    async fn test_suggest_edits_returns_trimmed_text() {
        let scripted = Arc::new(ScriptedGenerator::with_text(vec![Ok(
            "\n1. Open on the product.\n".into(),
        )]));
        let comparison = json!({ "high_performing": [], "low_performing": { "post_id": "1" } });

        let edits = generator(&scripted).suggest_edits(&comparison).await.unwrap();
        assert_eq!(edits, "1. Open on the product.");

        let requests = scripted.requests();
        assert_eq!(requests[0].0, ModelTier::Vision);
        assert_eq!(text_of(&requests[0].1[1]), comparison.to_string());
    }
}
