//! Derived per-post features.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Hook of a video: what grabs attention in the first second.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HookFeatures {
    /// Caption text visible on screen at t = 1s
    pub screen_hook: Option<String>,
    /// First spoken sentence
    pub audio_hook: Option<String>,
    /// Short description of what the creator is doing
    pub visual_style_summary: Option<String>,
    pub analysis: Option<HookAnalysis>,
}

/// Structured reading of the hook-analysis reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HookAnalysis {
    Parsed {
        visual: String,
        audio: String,
        instructions: String,
    },
    Unparsed {
        raw_text: String,
    },
}

impl HookAnalysis {
    const VISUAL_MARKER: &'static str = "VISUAL_STYLE:";
    const AUDIO_MARKER: &'static str = "AUDIO_STYLE:";
    const INSTRUCTIONS_MARKER: &'static str = "CREATOR_INSTRUCTIONS:";

    /// Split a reply of the form
    /// `VISUAL_STYLE: ... AUDIO_STYLE: ... [CREATOR_INSTRUCTIONS: ...]`.
    pub fn parse(text: &str) -> Self {
        let (Some(visual_at), Some(audio_at)) =
            (text.find(Self::VISUAL_MARKER), text.find(Self::AUDIO_MARKER))
        else {
            return Self::Unparsed {
                raw_text: text.trim().to_string(),
            };
        };

        if visual_at > audio_at {
            return Self::Unparsed {
                raw_text: text.trim().to_string(),
            };
        }

        let visual = &text[visual_at + Self::VISUAL_MARKER.len()..audio_at];
        let rest = &text[audio_at + Self::AUDIO_MARKER.len()..];

        let (audio, instructions) = match rest.find(Self::INSTRUCTIONS_MARKER) {
            Some(at) => (&rest[..at], &rest[at + Self::INSTRUCTIONS_MARKER.len()..]),
            None => (rest, ""),
        };

        Self::Parsed {
            visual: visual.trim().to_string(),
            audio: audio.trim().to_string(),
            instructions: instructions.trim().to_string(),
        }
    }
}

/// Whether and how the creator appears on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CreatorVisibility {
    FaceVisible,
    OnlyHands,
    No,
}

impl CreatorVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreatorVisibility::FaceVisible => "Face is visible",
            CreatorVisibility::OnlyHands => "Only hands",
            CreatorVisibility::No => "No",
        }
    }
}

/// Creator and product presence across the keyframes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StyleFeatures {
    pub creator_visible: CreatorVisibility,
    pub product_visible: bool,
    pub creator_speaking: bool,
}

/// How the creator is filmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ShootingStyle {
    TalkingHead,
    Voiceover,
    HandsOnly,
    ProductShowcase,
    Vibes,
    Other,
}

impl ShootingStyle {
    pub const ALL: [ShootingStyle; 6] = [
        ShootingStyle::TalkingHead,
        ShootingStyle::Voiceover,
        ShootingStyle::HandsOnly,
        ShootingStyle::ProductShowcase,
        ShootingStyle::Vibes,
        ShootingStyle::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShootingStyle::TalkingHead => "talking-head",
            ShootingStyle::Voiceover => "voiceover",
            ShootingStyle::HandsOnly => "hands-only",
            ShootingStyle::ProductShowcase => "product-showcase",
            ShootingStyle::Vibes => "vibes",
            ShootingStyle::Other => "other",
        }
    }
}

impl fmt::Display for ShootingStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShootingStyle {
    type Err = String;

    /// Lenient: accepts `talking_head`, `Talking Head` and `talking-head`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == '_' || c == ' ' { '-' } else { c })
            .collect();

        Self::ALL
            .into_iter()
            .find(|style| style.as_str() == normalized)
            .ok_or_else(|| format!("unknown shooting style: {}", s))
    }
}

/// Pitch statistics over voiced frames, in Hz.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PitchMetrics {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub range: f64,
    pub std: f64,
    /// std / mean
    pub variability: f64,
}

/// Frame RMS statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VolumeMetrics {
    pub mean: f64,
    pub max: f64,
    pub std: f64,
    /// std / mean
    pub dynamics: f64,
    /// Fraction of frames below 10% of the mean RMS
    pub silence_ratio: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SpeechRateMetrics {
    pub onsets_per_second: f64,
    /// Pauses per second
    pub pause_frequency: f64,
    /// Seconds
    pub avg_pause_duration: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VoiceQualityMetrics {
    /// Harmonics-to-noise ratio in dB
    pub hnr: f64,
    pub jitter: f64,
    pub shimmer: f64,
}

/// Acoustic metrics computed on the isolated speech track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AudioFeatures {
    pub pitch: PitchMetrics,
    pub volume: VolumeMetrics,
    pub speech_rate: SpeechRateMetrics,
    pub voice_quality: VoiceQualityMetrics,
}
