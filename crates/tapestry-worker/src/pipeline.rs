//! Batch orchestration.
//!
//! Payloads are split into fixed-size batches. Each batch runs the stages
//! in a fixed order: dedup, acquisition, scoring, transcription, style,
//! hook, visual, audio, shooting style, cleanup and the index commit.
//! Stage failures only null the affected record's fields. Only the final
//! commit can fail a batch, and a failed batch writes nothing.

use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tapestry_index::{CollectionSchema, VectorIndex, WeaviateClient};
use tapestry_media::{BrowserLauncher, WebDriverConfig, WebDriverLauncher};
use tapestry_ml_client::{
    AnthropicClient, ContentGenerator, FeatureGenerator, PromptLibrary, Transcriber, WhisperClient,
};
use tapestry_models::{PostPayload, PostRecord, VectorDocument};
use tapestry_storage::{ObjectStore, S3Client};
use tracing::{debug, error, info, warn, Instrument};

use crate::acquisition::AcquisitionCache;
use crate::analysis::Analyzer;
use crate::cleanup::release_artifacts;
use crate::config::PipelineConfig;
use crate::error::WorkerResult;
use crate::logging::RecordLogger;
use crate::metrics;
use crate::stages::Stages;

/// External services the pipeline talks to.
pub struct Services {
    pub store: Arc<dyn ObjectStore>,
    pub index: Arc<dyn VectorIndex>,
    pub launcher: Arc<dyn BrowserLauncher>,
    pub generator: Arc<dyn ContentGenerator>,
    pub transcriber: Arc<dyn Transcriber>,
    pub prompts: PromptLibrary,
}

/// Ingestion pipeline.
pub struct Pipeline {
    index: Arc<dyn VectorIndex>,
    acquisition: AcquisitionCache,
    stages: Stages,
    analyzer: Analyzer,
    config: PipelineConfig,
    schema: CollectionSchema,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, services: Services) -> WorkerResult<Self> {
        config.validate()?;

        let acquisition = AcquisitionCache::new(
            services.store.clone(),
            services.launcher,
            config.acquisition.clone(),
        )?;
        let features = FeatureGenerator::new(services.generator, services.prompts);
        let analyzer = Analyzer::new(
            services.store,
            features.clone(),
            services.transcriber.clone(),
            config.clone(),
        );
        let stages = Stages::new(features, services.transcriber, config.clone());

        Ok(Self {
            index: services.index,
            acquisition,
            stages,
            analyzer,
            config,
            schema: CollectionSchema::post(),
        })
    }

    /// Build the pipeline against the services named in the environment.
    pub async fn from_env() -> WorkerResult<Self> {
        let config = PipelineConfig::from_env();
        info!(
            batch_size = config.batch_size,
            work_dir = %config.work_dir.display(),
            max_parallel_records = config.max_parallel_records,
            "Pipeline config loaded"
        );

        let store = S3Client::from_env().await?;
        if let Err(e) = store.check_connectivity().await {
            warn!(bucket = store.bucket(), "Object storage not reachable at startup: {}", e);
        }

        let services = Services {
            store: Arc::new(store),
            index: Arc::new(WeaviateClient::from_env()?),
            launcher: Arc::new(WebDriverLauncher::new(WebDriverConfig::from_env())),
            generator: Arc::new(AnthropicClient::from_env()?),
            transcriber: Arc::new(WhisperClient::from_env()?),
            prompts: PromptLibrary::from_env()?,
        };

        Self::new(config, services)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Single-video analysis over the same services.
    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    /// Ingest a JSON object or array of post payloads.
    ///
    /// Returns the documents actually written to the index.
    pub async fn ingest(&self, body: Value) -> WorkerResult<Vec<VectorDocument>> {
        let payloads = PostPayload::parse_many(body)?;
        self.ingest_payloads(payloads).await
    }

    pub async fn ingest_payloads(
        &self,
        payloads: Vec<PostPayload>,
    ) -> WorkerResult<Vec<VectorDocument>> {
        metrics::record_received(payloads.len());
        let records = unique_records(payloads);
        if records.is_empty() {
            return Ok(Vec::new());
        }

        tokio::fs::create_dir_all(&self.config.work_dir).await?;

        let total = records.len();
        let mut records = records.into_iter().peekable();
        let mut written = Vec::new();
        let mut batch_number = 0usize;

        while records.peek().is_some() {
            batch_number += 1;
            let batch: Vec<PostRecord> = records.by_ref().take(self.config.batch_size).collect();
            let size = batch.len();
            info!(batch = batch_number, size, total, "Processing batch");

            match self.run_batch(batch).await {
                Ok(documents) => {
                    info!(
                        batch = batch_number,
                        written = documents.len(),
                        "Batch complete"
                    );
                    written.extend(documents);
                }
                Err(e) => {
                    error!(batch = batch_number, size, "Batch failed, nothing written: {}", e);
                    metrics::record_batch_failed();
                }
            }
        }

        Ok(written)
    }

    async fn run_batch(&self, records: Vec<PostRecord>) -> WorkerResult<Vec<VectorDocument>> {
        let records = self.drop_indexed(records).await;
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let scratch = tempfile::Builder::new()
            .prefix("batch-")
            .tempdir_in(&self.config.work_dir)?;
        let dir = scratch.path();

        let records = self.acquire(records, dir).await;

        let now = Utc::now();
        let records: Vec<PostRecord> = records
            .into_iter()
            .map(|record| self.stages.score(record, now))
            .collect();

        let records = self
            .for_each(records, |r| self.stages.transcribe(r, dir))
            .await;
        let records = self.for_each(records, |r| self.stages.style(r)).await;
        let records = self.for_each(records, |r| self.stages.hook(r)).await;
        let records = self.for_each(records, |r| self.stages.visual(r)).await;
        let records = self
            .for_each(records, |r| self.stages.audio(r, dir))
            .await;
        let records = self
            .for_each(records, |r| self.stages.shooting_style(r))
            .await;
        let records = self.for_each(records, release_artifacts).await;

        let result = self.commit(records).await;

        let scratch_path = dir.to_path_buf();
        if let Err(e) = scratch.close() {
            warn!(dir = %scratch_path.display(), "Failed to remove batch directory: {}", e);
        }

        result
    }

    /// Drop records whose document is already indexed.
    async fn drop_indexed(&self, records: Vec<PostRecord>) -> Vec<PostRecord> {
        let checked: Vec<(PostRecord, bool)> = stream::iter(records)
            .map(|record| async move {
                let present = match self.index.exists(record.post_id.as_str()).await {
                    Ok(present) => present,
                    Err(e) => {
                        warn!(post_id = %record.post_id, "Index lookup failed, keeping record: {}", e);
                        false
                    }
                };
                (record, present)
            })
            .buffered(self.config.max_parallel_records)
            .collect()
            .await;

        let before = checked.len();
        let fresh: Vec<PostRecord> = checked
            .into_iter()
            .filter_map(|(record, present)| (!present).then_some(record))
            .collect();

        let skipped = before - fresh.len();
        if skipped > 0 {
            info!(skipped, "Skipping posts already in the index");
            metrics::record_deduplicated(skipped);
        }
        fresh
    }

    /// Acquire media sequentially through one browser session.
    async fn acquire(&self, records: Vec<PostRecord>, dir: &Path) -> Vec<PostRecord> {
        let mut session = self.acquisition.session();
        let mut acquired = Vec::with_capacity(records.len());

        for record in records {
            let logger = RecordLogger::new(record.post_id.as_str(), "acquisition");
            logger.log_start();

            let acquired_media = session
                .acquire(record.post_id.as_str(), &record.url, dir)
                .instrument(logger.create_span())
                .await;
            match acquired_media {
                Ok(media) => {
                    if media.cache_hit {
                        logger.log_progress("served from cache");
                    }
                    logger.log_completion();
                    acquired.push(PostRecord {
                        video_link: Some(media.video_link),
                        local_video_path: Some(media.local_path),
                        ..record
                    });
                }
                Err(e) => {
                    logger.log_failure(&e.to_string());
                    acquired.push(record);
                }
            }
        }

        session.close().await;
        acquired
    }

    /// Run one stage over every record, bounded and order-preserving.
    async fn for_each<F, Fut>(&self, records: Vec<PostRecord>, stage: F) -> Vec<PostRecord>
    where
        F: FnMut(PostRecord) -> Fut,
        Fut: Future<Output = PostRecord>,
    {
        stream::iter(records)
            .map(stage)
            .buffered(self.config.max_parallel_records)
            .collect()
            .await
    }

    /// Write the batch's documents. Records without media are left out so a
    /// later ingestion can retry them.
    async fn commit(&self, records: Vec<PostRecord>) -> WorkerResult<Vec<VectorDocument>> {
        let (ready, missing): (Vec<PostRecord>, Vec<PostRecord>) = records
            .into_iter()
            .partition(|record| record.video_link.is_some());

        for record in &missing {
            debug!(post_id = %record.post_id, "No media acquired, not indexing");
        }
        if ready.is_empty() {
            return Ok(Vec::new());
        }

        let documents = ready
            .iter()
            .map(VectorDocument::from_record)
            .collect::<Result<Vec<_>, _>>()?;

        self.index.ensure_collection(&self.schema).await?;
        let written = self.index.upsert_batch(documents).await?;
        metrics::record_documents_written(written.len());

        Ok(written)
    }
}

/// Records for the first occurrence of each `post_id`.
fn unique_records(payloads: Vec<PostPayload>) -> Vec<PostRecord> {
    let received = payloads.len();
    let mut seen = HashSet::new();
    let records: Vec<PostRecord> = payloads
        .into_iter()
        .filter(|payload| seen.insert(payload.post_id.clone()))
        .map(PostRecord::from_payload)
        .collect();

    if records.len() < received {
        debug!(
            collapsed = received - records.len(),
            "Collapsed duplicate post ids"
        );
    }
    records
}
