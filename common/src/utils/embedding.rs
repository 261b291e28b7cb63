use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    sync::Arc,
    time::Duration,
};

use async_openai::{config::OpenAIConfig, types::CreateEmbeddingRequestArgs, Client};
use async_trait::async_trait;
use tracing::debug;

use crate::{
    error::AppError,
    utils::{
        config::{AppConfig, EmbeddingBackend},
        deadline::with_deadline,
    },
};

const EMBEDDING_SERVICE: &str = "embedding";

/// Turns text into fixed-length vectors.
///
/// Implementations return exactly one vector per input, in input order, each
/// of length [`EmbeddingClient::dimension`].
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError>;

    fn dimension(&self) -> usize;

    /// Identifier of the model producing the vectors.
    fn model_code(&self) -> String;
}

#[derive(Clone)]
pub struct EmbeddingProvider {
    inner: EmbeddingInner,
    timeout: Duration,
}

#[derive(Clone)]
enum EmbeddingInner {
    OpenAI {
        client: Arc<Client<OpenAIConfig>>,
        model: String,
        dimensions: u32,
    },
    Hashed {
        dimension: usize,
    },
}

impl EmbeddingProvider {
    pub fn backend_label(&self) -> &'static str {
        match self.inner {
            EmbeddingInner::Hashed { .. } => "hashed",
            EmbeddingInner::OpenAI { .. } => "openai",
        }
    }

    pub fn new_openai(
        client: Arc<Client<OpenAIConfig>>,
        model: String,
        dimensions: u32,
        timeout: Duration,
    ) -> Self {
        EmbeddingProvider {
            inner: EmbeddingInner::OpenAI {
                client,
                model,
                dimensions,
            },
            timeout,
        }
    }

    pub fn new_hashed(dimension: usize) -> Self {
        EmbeddingProvider {
            inner: EmbeddingInner::Hashed {
                dimension: dimension.max(1),
            },
            timeout: Duration::from_secs(60),
        }
    }

    pub fn from_config(config: &AppConfig, client: Arc<Client<OpenAIConfig>>) -> Self {
        match config.embedding_backend {
            EmbeddingBackend::OpenAI => Self::new_openai(
                client,
                config.embedding_model.clone(),
                config.embedding_dimensions,
                config.request_timeout(),
            ),
            EmbeddingBackend::Hashed => Self::new_hashed(config.embedding_dimensions as usize),
        }
    }

    async fn embed_openai(
        client: &Client<OpenAIConfig>,
        model: &str,
        dimensions: u32,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, AppError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(model)
            .input(texts.to_vec())
            .dimensions(dimensions)
            .build()
            .map_err(|e| AppError::EmbeddingService(e.to_string()))?;

        let response = client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| AppError::EmbeddingService(e.to_string()))?;

        // The service reports each vector's input position; do not rely on response order.
        let mut data = response.data;
        data.sort_by_key(|item| item.index);

        Ok(data.into_iter().map(|item| item.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingClient for EmbeddingProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = match &self.inner {
            EmbeddingInner::Hashed { dimension } => texts
                .iter()
                .map(|text| hashed_embedding(text, *dimension))
                .collect(),
            EmbeddingInner::OpenAI {
                client,
                model,
                dimensions,
            } => {
                with_deadline(
                    EMBEDDING_SERVICE,
                    self.timeout,
                    Self::embed_openai(client, model, *dimensions, texts),
                )
                .await?
            }
        };

        check_embeddings(texts.len(), self.dimension(), &embeddings)?;

        debug!(
            backend = self.backend_label(),
            inputs = texts.len(),
            dimension = self.dimension(),
            "embedded batch"
        );

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        match &self.inner {
            EmbeddingInner::Hashed { dimension } => *dimension,
            EmbeddingInner::OpenAI { dimensions, .. } => *dimensions as usize,
        }
    }

    fn model_code(&self) -> String {
        match &self.inner {
            EmbeddingInner::OpenAI { model, .. } => model.clone(),
            EmbeddingInner::Hashed { dimension } => format!("hashed-{dimension}"),
        }
    }
}

/// Enforces the batch contract: one vector per input, each of the expected length.
pub fn check_embeddings(
    expected_count: usize,
    expected_dimension: usize,
    embeddings: &[Vec<f32>],
) -> Result<(), AppError> {
    if embeddings.len() != expected_count {
        return Err(AppError::EmbeddingService(format!(
            "expected {expected_count} embeddings, received {}",
            embeddings.len()
        )));
    }

    if let Some((position, vector)) = embeddings
        .iter()
        .enumerate()
        .find(|(_, vector)| vector.len() != expected_dimension)
    {
        return Err(AppError::EmbeddingService(format!(
            "embedding {position} has dimension {}, expected {expected_dimension}",
            vector.len()
        )));
    }

    Ok(())
}

// Helper functions for hashed embeddings
fn hashed_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let dim = dimension.max(1);
    let mut vector = vec![0.0f32; dim];
    if text.is_empty() {
        return vector;
    }

    let mut token_count = 0f32;
    for token in tokens(text) {
        token_count += 1.0;
        let idx = bucket(&token, dim);
        vector[idx] += 1.0;
    }

    if token_count == 0.0 {
        return vector;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }

    vector
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

fn bucket(token: &str, dimension: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    (hasher.finish() as usize) % dimension
}
