pub mod answer_retrieval;
pub mod chat;
pub mod context;

use std::sync::Arc;

use common::{
    error::AppError,
    storage::vector_index::{ScoredRecord, VectorIndex},
    utils::{config::AppConfig, embedding::EmbeddingClient},
};
use tracing::{debug, instrument};

pub use chat::ChatOrchestrator;
pub use context::{assemble_context, AssembledContext};

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Upper bound, in chars, of the context handed to the generation model.
    pub max_context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            max_context_chars: 12_000,
        }
    }
}

impl RetrievalConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            top_k: config.retrieval_top_k,
            max_context_chars: config.max_context_chars,
        }
    }
}

/// Records nearest to one query, most similar first, never more than the requested `k`.
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    pub matches: Vec<ScoredRecord>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn context(&self, max_chars: usize) -> AssembledContext {
        assemble_context(&self.matches, max_chars)
    }
}

pub struct RetrievalEngine {
    embedding: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    config: RetrievalConfig,
}

impl RetrievalEngine {
    pub fn new(
        embedding: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedding,
            index,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Embeds `query` and returns up to `k` nearest records. Fewer matches than `k`, or
    /// none at all, is a normal result.
    #[instrument(skip_all, fields(top_k = k, query_chars = query.chars().count()))]
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<RetrievalResult, AppError> {
        if k == 0 {
            return Ok(RetrievalResult::default());
        }
        if query.trim().is_empty() {
            return Err(AppError::Validation("Query must not be empty".into()));
        }

        let vector = self
            .embedding
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::EmbeddingService("no embedding returned for query".into()))?;

        let expected = self.embedding.dimension();
        if vector.len() != expected {
            return Err(AppError::Configuration(format!(
                "query embedding has dimension {}, index expects {expected}",
                vector.len()
            )));
        }

        let mut matches = self.index.query(&vector, k).await?;
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(k);

        debug!(
            backend = self.index.backend_label(),
            matches = matches.len(),
            top_score = matches.first().map(|m| m.score),
            "retrieval finished"
        );

        Ok(RetrievalResult { matches })
    }
}
