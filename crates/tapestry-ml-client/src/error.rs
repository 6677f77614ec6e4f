//! Content client error types.

use thiserror::Error;

pub type ContentResult<T> = Result<T, ContentError>;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rate limited by content service")]
    RateLimited,

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("Content service returned {status}: {message}")]
    Service { status: u16, message: String },

    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Media error: {0}")]
    Media(#[from] tapestry_media::MediaError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContentError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    pub fn missing_input(msg: impl Into<String>) -> Self {
        Self::MissingInput(msg.into())
    }

    /// Whether the same request should be sent again.
    ///
    /// Service errors are hard failures for the call; only rate limits and
    /// unparseable replies are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ContentError::RateLimited | ContentError::MalformedResponse(_)
        )
    }
}
