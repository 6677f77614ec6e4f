//! Video analysis and edit recommendation handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AnalyzeVideoRequest {
    pub post_id: String,
    /// Post caption, passed to the summary prompt
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeVideoResponse {
    pub summary: Value,
    pub screenplay: Value,
}

/// Summarize a stored video and turn it into a screenplay.
pub async fn analyze_video(
    State(state): State<AppState>,
    body: Result<Json<AnalyzeVideoRequest>, JsonRejection>,
) -> ApiResult<Json<AnalyzeVideoResponse>> {
    let Json(request) = body.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    info!(post_id = %request.post_id, "Video analysis request");

    let pipeline = state.pipeline.clone();
    let analysis = tokio::spawn(async move {
        pipeline
            .analyzer()
            .analyze_post(&request.post_id, request.description.as_deref())
            .await
    })
    .await
    .map_err(|e| ApiError::internal(format!("Analysis task failed: {}", e)))??;

    Ok(Json(AnalyzeVideoResponse {
        summary: analysis.summary,
        screenplay: analysis.screenplay,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SuggestEditsRequest {
    #[serde(default)]
    pub high_performing: Vec<Value>,
    pub low_performing: Value,
}

#[derive(Debug, Serialize)]
pub struct SuggestEditsResponse {
    pub edits: String,
}

/// Recommend edits to a low-performing video from high-performing examples.
pub async fn suggest_edits(
    State(state): State<AppState>,
    body: Result<Json<SuggestEditsRequest>, JsonRejection>,
) -> ApiResult<Json<SuggestEditsResponse>> {
    let Json(request) = body.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;

    if !request.low_performing.is_object() {
        return Err(ApiError::bad_request("low_performing must be an object"));
    }
    if let Some(index) = request.high_performing.iter().position(|v| !v.is_object()) {
        return Err(ApiError::bad_request(format!(
            "high_performing[{}] must be an object",
            index
        )));
    }
    info!(
        high_performing = request.high_performing.len(),
        "Edit recommendation request"
    );

    let edits = state
        .pipeline
        .analyzer()
        .suggest_edits(request.high_performing, request.low_performing)
        .await?;
    Ok(Json(SuggestEditsResponse { edits }))
}
