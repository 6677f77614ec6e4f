//! Clients for the hosted content-generation and transcription services.
//!
//! The [`ContentGenerator`] and [`Transcriber`] traits are the seams the
//! pipeline depends on. [`FeatureGenerator`] turns frames and transcripts
//! into typed post features, video summaries, screenplays and edit
//! recommendations on top of any content generator.

pub mod client;
pub mod error;
pub mod generators;
pub mod prompts;
pub mod transcribe;

pub use client::{
    extract_json, AnthropicClient, AnthropicConfig, ContentBlock, ContentGenerator, ModelTier,
};
pub use error::{ContentError, ContentResult};
pub use generators::{
    audio_hook, heuristic_shooting_style, FeatureGenerator, KeyframeMoment, NO_HOOK_TEXT,
};
pub use prompts::PromptLibrary;
pub use transcribe::{Transcriber, WhisperClient, WhisperConfig};
