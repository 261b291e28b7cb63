pub mod batch;

use std::sync::Arc;

use async_openai::{config::OpenAIConfig, Client};
use common::{
    error::AppError,
    storage::{
        backend::{ensure_index_profile, open_vector_index, IndexSetup},
        vector_index::VectorIndex,
    },
    utils::{
        admin_secret::AdminSecret, config::AppConfig, embedding::EmbeddingProvider,
        generation::OpenAIGenerationClient,
    },
};
use ingestion_pipeline::{
    IngestionConfig, IngestionPipeline, PdfTextExtractor, PipelineServices,
};
use retrieval_pipeline::{ChatOrchestrator, RetrievalConfig, RetrievalEngine};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();
}

/// Shared service clients, created once per process.
pub struct Runtime {
    pub index: Arc<dyn VectorIndex>,
    pub embedding: Arc<EmbeddingProvider>,
    pub openai: Arc<Client<OpenAIConfig>>,
}

impl Runtime {
    /// Connects the vector store and verifies it was built with the configured
    /// embedding model and dimension. `setup` decides whether a missing index is created.
    pub async fn connect(config: &AppConfig, setup: IndexSetup) -> Result<Self, AppError> {
        let openai = Arc::new(Client::with_config(
            OpenAIConfig::new()
                .with_api_key(&config.openai_api_key)
                .with_api_base(&config.openai_base_url),
        ));

        let embedding = Arc::new(EmbeddingProvider::from_config(config, Arc::clone(&openai)));
        info!(
            embedding_backend = embedding.backend_label(),
            embedding_dimension = config.embedding_dimensions,
            "Embedding provider initialized"
        );

        let index = open_vector_index(config, setup).await?;
        ensure_index_profile(index.as_ref(), embedding.as_ref()).await?;

        Ok(Self {
            index,
            embedding,
            openai,
        })
    }

    pub fn ingestion_pipeline(
        &self,
        config: &AppConfig,
        pipeline_config: IngestionConfig,
    ) -> IngestionPipeline {
        let services = PipelineServices::new(
            AdminSecret::new(&config.admin_password),
            Arc::new(PdfTextExtractor),
            Arc::clone(&self.embedding) as _,
            Arc::clone(&self.index),
        );
        IngestionPipeline::with_config(services, pipeline_config)
    }

    pub fn chat_orchestrator(&self, config: &AppConfig) -> ChatOrchestrator {
        let retrieval = RetrievalEngine::new(
            Arc::clone(&self.embedding) as _,
            Arc::clone(&self.index),
            RetrievalConfig::from_app_config(config),
        );
        let generation = OpenAIGenerationClient::new(
            Arc::clone(&self.openai),
            config.generation_model.clone(),
            config.request_timeout(),
        );
        ChatOrchestrator::new(retrieval, Arc::new(generation))
    }
}
