//! Shared data models for the Tapestry ingestion pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Incoming post payloads and the in-flight `PostRecord`
//! - Derived features (hook, style, audio metrics, shooting style)
//! - The `VectorDocument` projection written to the index
//! - JSON Schemas of the payload and document shapes

pub mod document;
pub mod features;
pub mod post;
pub mod schema;

// Re-export common types
pub use document::VectorDocument;
pub use features::{
    AudioFeatures, CreatorVisibility, HookAnalysis, HookFeatures, PitchMetrics, ShootingStyle,
    SpeechRateMetrics, StyleFeatures, VoiceQualityMetrics, VolumeMetrics,
};
pub use post::{
    is_valid_post_id, DiscoveryInput, EngagementCounters, PayloadError, PostId, PostPayload,
    PostRecord,
};
pub use schema::IngestSchemas;
