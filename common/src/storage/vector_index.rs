use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Metadata stored next to each vector; enough to rebuild retrieval context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub text: String,
    pub source: String,
}

/// The persisted unit of the vector store.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: RecordMetadata,
}

/// A stored record returned by a nearest-neighbour query, with its similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub id: String,
    pub metadata: RecordMetadata,
    pub score: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexDescription {
    /// Vector dimension the index was created with, when the backend reports it.
    pub dimension: Option<usize>,
    pub record_count: Option<u64>,
}

/// Embedding model and dimension an index is populated with. Ingestion and
/// retrieval must agree on it or similarity scores are meaningless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexProfile {
    pub embedding_model: String,
    pub dimension: usize,
}

/// External vector database. Records are only ever appended by fresh id.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, records: Vec<IndexedRecord>) -> Result<(), AppError>;

    /// Up to `top_k` nearest records, most similar first, metadata included.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredRecord>, AppError>;

    async fn describe(&self) -> Result<IndexDescription, AppError>;

    fn backend_label(&self) -> &'static str;

    /// Fails with `AppError::Configuration` when the index was built for a
    /// different embedding profile.
    async fn ensure_profile(&self, profile: &IndexProfile) -> Result<(), AppError> {
        let description = self.describe().await?;
        check_dimension(self.backend_label(), description.dimension, profile.dimension)
    }
}

pub fn check_dimension(
    backend: &str,
    reported: Option<usize>,
    expected: usize,
) -> Result<(), AppError> {
    match reported {
        Some(dimension) if dimension != expected => Err(AppError::Configuration(format!(
            "{backend} index has dimension {dimension} but the embedding model produces {expected}"
        ))),
        _ => Ok(()),
    }
}
