//! Payload and document schemas.

use axum::Json;
use tapestry_models::IngestSchemas;

/// JSON Schemas of the ingestion payload and the indexed document.
pub async fn schemas() -> Json<IngestSchemas> {
    Json(IngestSchemas::generate())
}
