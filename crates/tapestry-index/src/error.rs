//! Vector index error types.

use thiserror::Error;

pub type IndexResult<T> = Result<T, IndexError>;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Index configuration error: {0}")]
    ConfigError(String),

    #[error("Index service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Rate limited by index service")]
    RateLimited,

    #[error("Index request failed ({status}): {message}")]
    RequestFailed { status: u16, message: String },

    #[error("Collection {collection} could not be created: {message}")]
    SchemaFailed { collection: String, message: String },

    #[error("Batch write failed: {failed} of {submitted} objects rejected{}", aborted_suffix(.aborted))]
    BatchFailed {
        failed: usize,
        submitted: usize,
        aborted: bool,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn aborted_suffix(aborted: &bool) -> &'static str {
    if *aborted {
        " (aborted)"
    } else {
        ""
    }
}

impl IndexError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Map a non-success HTTP status and body to an error.
    pub fn from_http_status(status: u16, body: impl Into<String>) -> Self {
        let message = body.into();
        match status {
            429 => Self::RateLimited,
            500..=599 => Self::ServiceUnavailable(format!("HTTP {}: {}", status, message)),
            _ => Self::RequestFailed { status, message },
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            IndexError::ServiceUnavailable(_) | IndexError::RateLimited => true,
            IndexError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}
