//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing and acquisition.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("No audio data in {0}")]
    NoAudioData(PathBuf),

    #[error("Audio analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("Browser session failed: {0}")]
    BrowserFailed(String),

    #[error("Timed out after {secs}s waiting for {selector}")]
    ElementTimeout { selector: String, secs: u64 },

    #[error("Element not found: {0}")]
    MissingElement(String),

    #[error("Download failed: {message}")]
    DownloadFailed { message: String },

    #[error("Download returned HTTP {0}")]
    DownloadStatus(u16),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a download failure error.
    pub fn download_failed(message: impl Into<String>) -> Self {
        Self::DownloadFailed {
            message: message.into(),
        }
    }

    /// Create a browser failure error.
    pub fn browser_failed(message: impl Into<String>) -> Self {
        Self::BrowserFailed(message.into())
    }

    /// Create an analysis failure error.
    pub fn analysis_failed(message: impl Into<String>) -> Self {
        Self::AnalysisFailed(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether this error came from the acquisition path (browser or download).
    pub fn is_acquisition_failure(&self) -> bool {
        matches!(
            self,
            MediaError::BrowserFailed(_)
                | MediaError::ElementTimeout { .. }
                | MediaError::MissingElement(_)
                | MediaError::DownloadFailed { .. }
                | MediaError::DownloadStatus(_)
        )
    }
}
