use std::sync::Arc;

use common::{storage::vector_index::VectorIndex, utils::config::AppConfig};
use ingestion_pipeline::IngestionPipeline;
use retrieval_pipeline::ChatOrchestrator;

#[derive(Clone)]
pub struct ApiState {
    pub config: AppConfig,
    pub ingestion: Arc<IngestionPipeline>,
    pub chat: Arc<ChatOrchestrator>,
    pub index: Arc<dyn VectorIndex>,
}

impl ApiState {
    pub fn new(
        config: AppConfig,
        ingestion: Arc<IngestionPipeline>,
        chat: Arc<ChatOrchestrator>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            config,
            ingestion,
            chat,
            index,
        }
    }
}
