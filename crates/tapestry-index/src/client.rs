//! Weaviate REST client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tapestry_models::VectorDocument;
use tracing::{debug, info, warn};

use crate::error::{IndexError, IndexResult};
use crate::schema::CollectionSchema;
use crate::{post_uuid, VectorIndex};

/// Per-item failures tolerated before a batch stops submitting.
pub const MAX_BATCH_ERRORS: usize = 10;

/// Configuration for the Weaviate client.
#[derive(Debug, Clone)]
pub struct WeaviateConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Forwarded to the vectorizer module
    pub openai_api_key: Option<String>,
    pub collection: String,
    pub timeout: Duration,
    pub max_retries: u32,
    /// Objects per `/v1/batch/objects` request
    pub batch_chunk_size: usize,
}

impl Default for WeaviateConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_key: None,
            openai_api_key: None,
            collection: crate::schema::POST_COLLECTION.to_string(),
            timeout: Duration::from_secs(60),
            max_retries: 3,
            batch_chunk_size: 100,
        }
    }
}

impl WeaviateConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("WEAVIATE_URL").unwrap_or(defaults.base_url),
            api_key: std::env::var("WEAVIATE_API_KEY").ok().filter(|k| !k.is_empty()),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            timeout: Duration::from_secs(
                std::env::var("WEAVIATE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            max_retries: std::env::var("WEAVIATE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            batch_chunk_size: std::env::var("WEAVIATE_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.batch_chunk_size),
            ..defaults
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_batch_chunk_size(mut self, size: usize) -> Self {
        self.batch_chunk_size = size.max(1);
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}

/// Per-object result of a batch write.
#[derive(Debug, Deserialize)]
struct BatchObjectResult {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    result: Option<BatchResultStatus>,
}

#[derive(Debug, Deserialize)]
struct BatchResultStatus {
    #[serde(default)]
    errors: Option<BatchErrors>,
}

#[derive(Debug, Deserialize)]
struct BatchErrors {
    #[serde(default)]
    error: Vec<BatchErrorItem>,
}

#[derive(Debug, Deserialize)]
struct BatchErrorItem {
    message: String,
}

impl BatchObjectResult {
    fn error_message(&self) -> Option<String> {
        let errors = self.result.as_ref()?.errors.as_ref()?;
        if errors.error.is_empty() {
            return None;
        }
        Some(
            errors
                .error
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Vector index client speaking the Weaviate v1 REST API.
pub struct WeaviateClient {
    http: Client,
    config: WeaviateConfig,
}

impl WeaviateClient {
    pub fn new(config: WeaviateConfig) -> IndexResult<Self> {
        if config.base_url.is_empty() {
            return Err(IndexError::config_error("WEAVIATE_URL is empty"));
        }
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(IndexError::Network)?;
        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> IndexResult<Self> {
        Self::new(WeaviateConfig::from_env())
    }

    pub fn collection(&self) -> &str {
        &self.config.collection
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let mut builder = self.http.request(method, url);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        if let Some(key) = &self.config.openai_api_key {
            builder = builder.header("X-OpenAI-Api-Key", key);
        }
        builder
    }

    /// Send a request, retrying retryable failures. Non-success statuses listed
    /// in `accept` are returned to the caller instead of becoming errors.
    async fn send(
        &self,
        build: impl Fn() -> RequestBuilder,
        accept: &[StatusCode],
    ) -> IndexResult<reqwest::Response> {
        self.with_retry(|| async {
            let response = build().send().await?;
            let status = response.status();
            if status.is_success() || accept.contains(&status) {
                return Ok(response);
            }
            let body = response.text().await.unwrap_or_default();
            Err(IndexError::from_http_status(status.as_u16(), body))
        })
        .await
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> IndexResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = IndexResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(
                        "Index request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn collection_exists(&self, name: &str) -> IndexResult<bool> {
        let path = format!("/v1/schema/{}", name);
        let response = self
            .send(|| self.request(Method::GET, &path), &[StatusCode::NOT_FOUND])
            .await?;
        Ok(response.status() != StatusCode::NOT_FOUND)
    }

    async fn write_chunk(&self, objects: &[Value]) -> IndexResult<Vec<BatchObjectResult>> {
        let body = json!({ "objects": objects });
        let response = self
            .send(
                || self.request(Method::POST, "/v1/batch/objects").json(&body),
                &[],
            )
            .await?;
        Ok(response.json().await?)
    }

    fn batch_object(&self, doc: &VectorDocument) -> IndexResult<Value> {
        Ok(json!({
            "class": self.config.collection,
            "id": post_uuid(&doc.post_id).to_string(),
            "properties": serde_json::to_value(doc)?,
        }))
    }
}

#[async_trait]
impl VectorIndex for WeaviateClient {
    async fn ensure_collection(&self, schema: &CollectionSchema) -> IndexResult<()> {
        if self.collection_exists(&schema.name).await? {
            debug!(collection = %schema.name, "Collection already exists");
            return Ok(());
        }

        let body = schema.to_json();
        let response = self
            .send(
                || self.request(Method::POST, "/v1/schema").json(&body),
                &[StatusCode::UNPROCESSABLE_ENTITY],
            )
            .await?;

        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            let message = response.text().await.unwrap_or_default();
            // Lost a creation race with another writer
            if message.contains("already exists") {
                return Ok(());
            }
            return Err(IndexError::SchemaFailed {
                collection: schema.name.clone(),
                message,
            });
        }

        info!(collection = %schema.name, "Created collection");
        Ok(())
    }

    async fn exists(&self, post_id: &str) -> IndexResult<bool> {
        let path = format!("/v1/objects/{}/{}", self.config.collection, post_uuid(post_id));
        let response = self
            .send(|| self.request(Method::HEAD, &path), &[StatusCode::NOT_FOUND])
            .await?;
        Ok(response.status() != StatusCode::NOT_FOUND)
    }

    async fn upsert_batch(&self, documents: Vec<VectorDocument>) -> IndexResult<Vec<VectorDocument>> {
        if documents.is_empty() {
            return Ok(documents);
        }

        let objects = documents
            .iter()
            .map(|doc| self.batch_object(doc))
            .collect::<IndexResult<Vec<_>>>()?;

        let mut submitted = 0;
        let mut failed = 0;
        let mut aborted = false;
        for chunk in objects.chunks(self.config.batch_chunk_size.max(1)) {
            submitted += chunk.len();
            let results = self.write_chunk(chunk).await?;
            for result in &results {
                if let Some(message) = result.error_message() {
                    failed += 1;
                    warn!(id = ?result.id, "Object rejected: {}", message);
                }
            }
            if failed > MAX_BATCH_ERRORS {
                warn!(failed, submitted, "Batch import stopped due to excessive errors");
                aborted = true;
                break;
            }
        }

        if failed > 0 {
            return Err(IndexError::BatchFailed {
                failed,
                submitted,
                aborted,
            });
        }

        info!(count = documents.len(), collection = %self.config.collection, "Wrote documents");
        Ok(documents)
    }
}
