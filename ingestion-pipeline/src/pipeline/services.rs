use std::sync::Arc;

use common::{
    storage::vector_index::VectorIndex,
    utils::{admin_secret::AdminSecret, embedding::EmbeddingClient},
};

use crate::utils::text_extraction::TextExtractor;

/// Collaborators the ingestion stages call out to. Constructed once at startup and shared
/// by every ingestion.
#[derive(Clone)]
pub struct PipelineServices {
    pub admin_secret: AdminSecret,
    pub extractor: Arc<dyn TextExtractor>,
    pub embedding: Arc<dyn EmbeddingClient>,
    pub index: Arc<dyn VectorIndex>,
}

impl PipelineServices {
    pub fn new(
        admin_secret: AdminSecret,
        extractor: Arc<dyn TextExtractor>,
        embedding: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            admin_secret,
            extractor,
            embedding,
            index,
        }
    }
}
