//! Prompt templates.
//!
//! Every prompt has a built-in default. A directory of `{name}.txt` files
//! can override any of them.

use std::collections::HashMap;
use std::path::Path;

use tracing::info;

use crate::error::ContentResult;

pub const SCREEN_HOOK: &str = "screen_hook";
pub const VISUAL_STYLE: &str = "visual_style_generator";
pub const HOOK_ANALYSIS: &str = "hook_analysis_generator";
pub const VISUAL_FEATURES: &str = "visual_feature_extractor";
pub const STYLE_FEATURES: &str = "style_feature_extractor";
pub const SHOOTING_STYLE: &str = "shooting_style_classifier";
pub const SUMMARY: &str = "summary_generator";
pub const SCREENPLAY: &str = "screenplay_generator";
pub const EDIT_RECOMMENDATIONS: &str = "edit_recommendations";

/// Placeholder replaced by the (truncated) transcript.
pub const TRANSCRIPT_PLACEHOLDER: &str = "{transcript}";
/// Placeholder replaced by the post caption.
pub const CAPTION_PLACEHOLDER: &str = "{caption}";

const BUILTIN: [(&str, &str); 9] = [
    (
        SCREEN_HOOK,
        "This is a frame from a video. Please identify and extract the main caption or hook text \
that appears on the screen. Focus only on the text that appears to be the main attention-grabbing \
statement or hook. If there is no hook, return 'NO HOOK'. \
Return just the text without any additional commentary.",
    ),
    (
        VISUAL_STYLE,
        "This is the opening frame of a short-form video. In 10 to 15 words, describe what the \
creator is doing and how the shot is framed. Reply with the description only.",
    ),
    (
        HOOK_ANALYSIS,
        "You are analyzing the hook of a short-form video. You are given its opening frame and \
the start of its transcript.\n\nTranscript: {transcript}\n\nReply in exactly this format:\n\
VISUAL_STYLE: <how the opening shot looks and what the creator is doing>\n\
AUDIO_STYLE: <how the opening sounds: delivery, pace, music or voice>\n\
CREATOR_INSTRUCTIONS: <concrete steps a creator could follow to recreate this hook>",
    ),
    (
        VISUAL_FEATURES,
        "The following moments are keyframes from the first seconds of a short-form video, in \
order. Describe the visual features of the video. Reply with a single JSON object with the keys \
\"setting\", \"lighting\", \"camera_angle\", \"camera_movement\", \"on_screen_text\", \
\"text_elements\", \"subjects\" and \"editing_pace\". \"text_elements\" is a one-sentence \
description of any text shown on screen, or an empty string.",
    ),
    (
        STYLE_FEATURES,
        "These images are keyframes from a short-form video. Decide whether a human face is \
visible in any of them, whether human hands are visible, whether a product is shown, and whether \
the creator appears to be speaking to the camera. Reply with a single JSON object: \
{\"face_visible\": bool, \"hand_visible\": bool, \"product_visible\": bool, \"creator_speaking\": bool}",
    ),
    (
        SHOOTING_STYLE,
        "Classify how this short-form video is filmed, using the observations below. Choose one \
label from: talking-head, voiceover, hands-only, product-showcase, vibes, other. \
Reply with a single JSON object: {\"shooting_style\": \"<label>\"}",
    ),
    (
        SUMMARY,
        "You are analyzing a short-form video. Its caption is: {caption}\n\nBelow are its \
keyframes in order. Each moment comes with its timestamp and the audio spoken between the previous \
moment and this one. Describe what happens in the video and why each moment matters. Reply with a \
single JSON object: {\"summary\": {\"description\": \"<overall description>\", \"key_moments\": \
[{\"timestamp\": <seconds>, \"visual\": \"<what is shown>\", \"audio\": \"<what is said>\", \
\"purpose\": \"<role of the moment>\"}]}}",
    ),
    (
        SCREENPLAY,
        "Turn the video analysis and complete transcript below into a screenplay a creator could \
shoot from. Keep the original order of moments and quote spoken lines from the transcript. Reply \
with a single JSON object: {\"screenplay\": [{\"scene\": <number>, \"start\": <seconds>, \
\"end\": <seconds>, \"shot\": \"<camera and framing>\", \"action\": \"<what happens>\", \
\"dialogue\": \"<spoken line or empty>\", \"on_screen_text\": \"<text or empty>\"}]}",
    ),
    (
        EDIT_RECOMMENDATIONS,
        "You are a short-form video editor. The JSON below holds the features of several \
high-performing videos and of one low-performing video on the same topic. Compare them and \
recommend concrete edits to the low-performing video: hook, pacing, on-screen text, audio and \
shooting style. Reply with a numbered list of edits, each with a one-sentence reason.",
    ),
];

/// Resolved prompt templates by name.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    templates: HashMap<&'static str, String>,
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PromptLibrary {
    /// Built-in templates only.
    pub fn builtin() -> Self {
        Self {
            templates: BUILTIN
                .iter()
                .map(|(name, text)| (*name, text.to_string()))
                .collect(),
        }
    }

    /// Built-in templates overridden by any `{name}.txt` under `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> ContentResult<Self> {
        let dir = dir.as_ref();
        let mut library = Self::builtin();

        for (name, _) in BUILTIN {
            let path = dir.join(format!("{}.txt", name));
            if path.is_file() {
                let text = std::fs::read_to_string(&path)?;
                info!(prompt = name, path = %path.display(), "Loaded prompt override");
                library.templates.insert(name, text.trim().to_string());
            }
        }

        Ok(library)
    }

    /// Honors `PROMPTS_DIR` when set.
    pub fn from_env() -> ContentResult<Self> {
        match std::env::var("PROMPTS_DIR") {
            Ok(dir) if !dir.is_empty() => Self::from_dir(dir),
            _ => Ok(Self::builtin()),
        }
    }

    pub fn get(&self, name: &str) -> &str {
        self.templates.get(name).map(String::as_str).unwrap_or_default()
    }

    /// Template with `{transcript}` substituted.
    pub fn render_with_transcript(&self, name: &str, transcript: &str) -> String {
        self.get(name).replace(TRANSCRIPT_PLACEHOLDER, transcript)
    }

    /// Template with `{caption}` substituted.
    pub fn render_with_caption(&self, name: &str, caption: &str) -> String {
        self.get(name).replace(CAPTION_PLACEHOLDER, caption)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_has_every_prompt() {
        let library = PromptLibrary::builtin();
        for name in [
            SCREEN_HOOK,
            VISUAL_STYLE,
            HOOK_ANALYSIS,
            VISUAL_FEATURES,
            STYLE_FEATURES,
            SHOOTING_STYLE,
            SUMMARY,
            SCREENPLAY,
            EDIT_RECOMMENDATIONS,
        ] {
            assert!(!library.get(name).is_empty(), "missing prompt {}", name);
        }
        assert_eq!(library.get("unknown"), "");
    }

    #[test]
    fn test_render_transcript() {
        let library = PromptLibrary::builtin();
        let prompt = library.render_with_transcript(HOOK_ANALYSIS, "Stop scrolling.");
        assert!(prompt.contains("Transcript: Stop scrolling."));
        assert!(!prompt.contains(TRANSCRIPT_PLACEHOLDER));

        let prompt = library.render_with_caption(SUMMARY, "3 serums I love");
        assert!(prompt.contains("Its caption is: 3 serums I love"));
        assert!(!prompt.contains(CAPTION_PLACEHOLDER));
    }

    #[test]
    fn test_directory_override() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("hook_analysis_generator.txt"),
            "  Custom {transcript} prompt\n",
        )
        .unwrap();

        let library = PromptLibrary::from_dir(dir.path()).unwrap();
        assert_eq!(
            library.render_with_transcript(HOOK_ANALYSIS, "hi"),
            "Custom hi prompt"
        );
        assert_eq!(library.get(SCREEN_HOOK), PromptLibrary::builtin().get(SCREEN_HOOK));
    }
}
