//! Short-form video ingestion pipeline.
//!
//! This crate provides:
//! - Batch orchestration from raw payloads to indexed documents
//! - Fetch-through media acquisition backed by object storage
//! - Per-record feature stages and impact scoring
//! - On-demand video analysis and edit recommendations
//! - Structured per-record logging and pipeline metrics

pub mod acquisition;
pub mod analysis;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod retry;
pub mod scoring;
pub mod stages;

pub use acquisition::{AcquiredMedia, AcquisitionCache, AcquisitionConfig, AcquisitionSession};
pub use analysis::{Analyzer, VideoAnalysis};
pub use config::PipelineConfig;
pub use error::{AcquisitionError, WorkerError, WorkerResult};
pub use logging::RecordLogger;
pub use pipeline::{Pipeline, Services};
pub use retry::{retry_async, RetryConfig, RetryResult};
pub use scoring::{impact_score, recency_score, ScoringWeights};
pub use stages::Stages;
