//! Request handlers.

pub mod analysis;
pub mod health;
pub mod ingest;
pub mod schema;

pub use analysis::{analyze_video, suggest_edits};
pub use health::health;
pub use ingest::ingest;
pub use schema::schemas;
