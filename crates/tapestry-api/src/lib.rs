//! Axum HTTP API for the ingestion pipeline.
//!
//! This crate provides:
//! - `POST /ingest` over the batch pipeline
//! - Health and Prometheus endpoints
//! - Request id and request logging middleware

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
