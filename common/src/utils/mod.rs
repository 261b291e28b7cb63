pub mod admin_secret;
pub mod config;
pub mod deadline;
pub mod embedding;
pub mod generation;
pub mod ingest_limits;
