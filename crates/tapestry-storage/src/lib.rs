//! Durable object storage for acquired media.
//!
//! This crate provides:
//! - The `ObjectStore` seam used by the acquisition cache
//! - An S3 implementation backed by the AWS SDK
//! - Deterministic object keys for post videos

pub mod client;
pub mod error;

use std::path::Path;

use async_trait::async_trait;

pub use client::{object_reference, S3Client, S3Config, DEFAULT_BUCKET, DEFAULT_REGION};
pub use error::{StorageError, StorageResult};

/// Content type for stored videos.
pub const VIDEO_CONTENT_TYPE: &str = "video/mp4";

/// Object key for a post's video.
///
/// The key doubles as a local file name, so ids carrying anything but ASCII
/// letters, digits, `_` or `-` are refused.
pub fn video_object_key(post_id: &str) -> StorageResult<String> {
    let safe = !post_id.is_empty()
        && post_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if !safe {
        return Err(StorageError::invalid_key(post_id));
    }
    Ok(format!("tiktok_{}.mp4", post_id))
}

/// Minimal object storage surface needed by the pipeline.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Upload `path` under `key` and return its durable reference.
    async fn upload_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<String>;

    async fn download_file(&self, key: &str, path: &Path) -> StorageResult<()>;

    /// Durable reference for `key`, whether or not it exists yet.
    fn reference(&self, key: &str) -> String;
}
