//! Ingestion handler.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use tapestry_models::VectorDocument;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Documents written by one ingestion call.
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub count: usize,
    pub documents: Vec<VectorDocument>,
}

/// Ingest one post payload or an array of them.
///
/// Runs the whole pipeline before responding. The response lists only the
/// documents that reached the index. The pipeline runs on its own task, so
/// a client that disconnects does not cut a batch short.
pub async fn ingest(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<IngestResponse>> {
    let Json(body) = body.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;

    let received = match &body {
        Value::Array(items) => items.len(),
        _ => 1,
    };
    info!(received, "Ingestion request");

    let pipeline = state.pipeline.clone();
    let documents = tokio::spawn(async move { pipeline.ingest(body).await })
        .await
        .map_err(|e| ApiError::internal(format!("Ingestion task failed: {}", e)))??;
    Ok(Json(IngestResponse {
        count: documents.len(),
        documents,
    }))
}
