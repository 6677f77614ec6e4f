//! Pipeline metrics.
//!
//! Emitted through the `metrics` facade; the API installs the Prometheus
//! recorder. Without a recorder these calls are no-ops.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const RECORDS_RECEIVED_TOTAL: &str = "tapestry_records_received_total";
    pub const RECORDS_DEDUPLICATED_TOTAL: &str = "tapestry_records_deduplicated_total";
    pub const DOCUMENTS_WRITTEN_TOTAL: &str = "tapestry_documents_written_total";
    pub const BATCHES_FAILED_TOTAL: &str = "tapestry_batches_failed_total";
    pub const STAGE_FAILURES_TOTAL: &str = "tapestry_stage_failures_total";
    pub const STAGE_DURATION_SECONDS: &str = "tapestry_stage_duration_seconds";
    pub const CACHE_HITS_TOTAL: &str = "tapestry_media_cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "tapestry_media_cache_misses_total";
}

pub fn record_received(count: usize) {
    counter!(names::RECORDS_RECEIVED_TOTAL).increment(count as u64);
}

pub fn record_deduplicated(count: usize) {
    counter!(names::RECORDS_DEDUPLICATED_TOTAL).increment(count as u64);
}

pub fn record_documents_written(count: usize) {
    counter!(names::DOCUMENTS_WRITTEN_TOTAL).increment(count as u64);
}

pub fn record_batch_failed() {
    counter!(names::BATCHES_FAILED_TOTAL).increment(1);
}

pub fn record_stage_failure(stage: &'static str) {
    counter!(names::STAGE_FAILURES_TOTAL, "stage" => stage).increment(1);
}

pub fn record_stage_duration(stage: &'static str, duration_secs: f64) {
    histogram!(names::STAGE_DURATION_SECONDS, "stage" => stage).record(duration_secs);
}

pub fn record_cache_hit() {
    counter!(names::CACHE_HITS_TOTAL).increment(1);
}

pub fn record_cache_miss() {
    counter!(names::CACHE_MISSES_TOTAL).increment(1);
}
