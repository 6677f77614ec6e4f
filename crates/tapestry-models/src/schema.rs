//! JSON Schemas for the public data shapes.

use schemars::schema::RootSchema;
use schemars::schema_for;
use serde::Serialize;

use crate::document::VectorDocument;
use crate::post::PostPayload;

/// Schemas of what the ingestion endpoint accepts and what it writes.
#[derive(Debug, Clone, Serialize)]
pub struct IngestSchemas {
    pub payload: RootSchema,
    pub document: RootSchema,
}

impl IngestSchemas {
    pub fn generate() -> Self {
        Self {
            payload: schema_for!(PostPayload),
            document: schema_for!(VectorDocument),
        }
    }
}
