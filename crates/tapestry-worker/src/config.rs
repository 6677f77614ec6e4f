//! Pipeline configuration.

use std::path::PathBuf;

use tapestry_media::keyframes::{DEFAULT_MIN_INTERVAL_SECS, DEFAULT_SCENE_CHANGE_THRESHOLD};
use tapestry_media::KeyframeParams;

use crate::acquisition::AcquisitionConfig;
use crate::error::WorkerResult;
use crate::scoring::ScoringWeights;

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Records per batch
    pub batch_size: usize,
    /// Parent of the per-batch scratch directories
    pub work_dir: PathBuf,
    /// Records processed concurrently within a stage
    pub max_parallel_records: usize,
    pub scene_change_threshold: f64,
    pub min_keyframe_interval_secs: f64,
    /// Decoded frames are downscaled to this width
    pub frame_max_width: Option<u32>,
    /// Opening segment used for visual features
    pub hook_window_secs: f64,
    /// Timestamp of the hook frame
    pub hook_frame_secs: f64,
    /// Upper bound on one FFmpeg invocation
    pub ffmpeg_timeout_secs: u64,
    pub acquisition: AcquisitionConfig,
    pub weights: ScoringWeights,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            work_dir: std::env::temp_dir().join("tapestry"),
            max_parallel_records: 4,
            scene_change_threshold: DEFAULT_SCENE_CHANGE_THRESHOLD,
            min_keyframe_interval_secs: DEFAULT_MIN_INTERVAL_SECS,
            frame_max_width: Some(720),
            hook_window_secs: 5.0,
            hook_frame_secs: 1.0,
            ffmpeg_timeout_secs: 600,
            acquisition: AcquisitionConfig::default(),
            weights: ScoringWeights::default(),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            batch_size: std::env::var("INGEST_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.batch_size),
            work_dir: std::env::var("INGEST_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            max_parallel_records: std::env::var("MAX_PARALLEL_RECORDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_parallel_records),
            scene_change_threshold: std::env::var("SCENE_CHANGE_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.scene_change_threshold),
            min_keyframe_interval_secs: std::env::var("MIN_KEYFRAME_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_keyframe_interval_secs),
            frame_max_width: defaults.frame_max_width,
            hook_window_secs: std::env::var("HOOK_WINDOW_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.hook_window_secs),
            hook_frame_secs: defaults.hook_frame_secs,
            ffmpeg_timeout_secs: std::env::var("FFMPEG_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.ffmpeg_timeout_secs),
            acquisition: AcquisitionConfig::from_env(),
            weights: ScoringWeights::from_env(),
        }
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_acquisition(mut self, acquisition: AcquisitionConfig) -> Self {
        self.acquisition = acquisition;
        self
    }

    /// Check values that would make the pipeline misbehave.
    pub fn validate(&self) -> WorkerResult<()> {
        self.weights.validate()
    }

    /// Keyframe parameters, optionally cut at `max_duration_secs`.
    pub fn keyframe_params(&self, max_duration_secs: Option<f64>) -> KeyframeParams {
        KeyframeParams {
            threshold: self.scene_change_threshold,
            min_interval_secs: self.min_keyframe_interval_secs,
            ..KeyframeParams::default()
        }
        .with_max_duration(max_duration_secs)
    }
}
