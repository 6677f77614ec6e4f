//! Structured per-record logging.
//!
//! Every stage of every record logs with the same `post_id` and `stage`
//! fields, and reports how long the stage took.

use std::time::{Duration, Instant};

use tracing::{info, warn, Span};

use crate::metrics;

/// Logger for one record passing through one stage.
#[derive(Debug, Clone)]
pub struct RecordLogger {
    post_id: String,
    stage: &'static str,
    started: Instant,
}

impl RecordLogger {
    /// Start timing `stage` for `post_id`.
    pub fn new(post_id: impl Into<String>, stage: &'static str) -> Self {
        Self {
            post_id: post_id.into(),
            stage,
            started: Instant::now(),
        }
    }

    pub fn log_start(&self) {
        tracing::debug!(post_id = %self.post_id, stage = self.stage, "Stage started");
    }

    pub fn log_progress(&self, message: &str) {
        info!(post_id = %self.post_id, stage = self.stage, "{}", message);
    }

    /// Log a row-scoped failure. The record continues with the field empty.
    pub fn log_failure(&self, message: &str) {
        warn!(
            post_id = %self.post_id,
            stage = self.stage,
            elapsed_ms = self.elapsed().as_millis() as u64,
            "Stage failed: {}", message
        );
        metrics::record_stage_failure(self.stage);
        metrics::record_stage_duration(self.stage, self.elapsed().as_secs_f64());
    }

    pub fn log_completion(&self) {
        info!(
            post_id = %self.post_id,
            stage = self.stage,
            elapsed_ms = self.elapsed().as_millis() as u64,
            "Stage completed"
        );
        metrics::record_stage_duration(self.stage, self.elapsed().as_secs_f64());
    }

    pub fn post_id(&self) -> &str {
        &self.post_id
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Span carrying the record's fields.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("record", post_id = %self.post_id, stage = self.stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_logger_fields() {
        let logger = RecordLogger::new("7301", "transcription");
        assert_eq!(logger.post_id(), "7301");
        assert_eq!(logger.stage(), "transcription");
        assert!(logger.elapsed() < Duration::from_secs(60));
    }
}
