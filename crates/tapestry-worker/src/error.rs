//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Why a record's media could not be acquired.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("Storage error: {0}")]
    Storage(#[from] tapestry_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] tapestry_media::MediaError),

    #[error("Storage operation failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        source: tapestry_storage::StorageError,
    },
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(#[from] tapestry_models::PayloadError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Acquisition failed: {0}")]
    Acquisition(#[from] AcquisitionError),

    #[error("Storage error: {0}")]
    Storage(#[from] tapestry_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] tapestry_media::MediaError),

    #[error("Content service error: {0}")]
    Content(#[from] tapestry_ml_client::ContentError),

    #[error("Index error: {0}")]
    Index(#[from] tapestry_index::IndexError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Whether the failure came from bad input rather than the environment.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            WorkerError::InvalidPayload(_) | WorkerError::InvalidRequest(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tapestry_models::PostPayload;

    #[test]
    fn test_payload_errors_are_client_errors() {
        let err: WorkerError = PostPayload::parse_many(json!("nope")).unwrap_err().into();
        assert!(err.is_client_error());
        assert!(WorkerError::invalid_request("bad id").is_client_error());
        assert!(!WorkerError::not_found("tiktok_1.mp4").is_client_error());
        assert!(!WorkerError::config_error("bad weights").is_client_error());
    }
}
