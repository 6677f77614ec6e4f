//! Vector index writer.
//!
//! Documents are keyed by a name-based UUID derived from `post_id`, so
//! re-ingesting a post overwrites its document instead of duplicating it.

pub mod client;
pub mod error;
pub mod schema;

use async_trait::async_trait;
use tapestry_models::VectorDocument;
use uuid::Uuid;

pub use client::{WeaviateClient, WeaviateConfig, MAX_BATCH_ERRORS};
pub use error::{IndexError, IndexResult};
pub use schema::{CollectionSchema, DataType, PropertySchema, POST_COLLECTION};

/// Deterministic document identity for a post.
pub fn post_uuid(post_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, post_id.as_bytes())
}

/// Document store with idempotent writes.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the collection if absent. Succeeds when it already exists.
    async fn ensure_collection(&self, schema: &CollectionSchema) -> IndexResult<()>;

    /// Whether a document for `post_id` is present.
    async fn exists(&self, post_id: &str) -> IndexResult<bool>;

    /// Write `documents` as one logical batch and return them on success.
    async fn upsert_batch(&self, documents: Vec<VectorDocument>) -> IndexResult<Vec<VectorDocument>>;
}
