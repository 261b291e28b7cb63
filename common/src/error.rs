use std::time::Duration;

use config::ConfigError;
use thiserror::Error;
use tokio::task::JoinError;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Document contains no extractable text")]
    EmptyDocument,
    #[error("Extraction error: {0}")]
    Extraction(String),
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),
    #[error("Embedding service error: {0}")]
    EmbeddingService(String),
    #[error("Generation service error: {0}")]
    GenerationService(String),
    #[error("Vector store error: {0}")]
    VectorStore(String),
    #[error("{service} call timed out after {}s", .after.as_secs())]
    Timeout {
        service: &'static str,
        after: Duration,
    },
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("{source} ({committed} chunks committed before the failure)")]
    Interrupted {
        committed: usize,
        #[source]
        source: Box<AppError>,
    },
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl AppError {
    /// The error that decides how a failure is reported, looking through
    /// `Interrupted` wrappers.
    pub fn root(&self) -> &AppError {
        match self {
            AppError::Interrupted { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the caller can fix the failure by changing the request.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self.root(),
            AppError::Auth(_)
                | AppError::Validation(_)
                | AppError::EmptyDocument
                | AppError::Extraction(_)
                | AppError::PayloadTooLarge(_)
        )
    }
}

impl From<surrealdb::Error> for AppError {
    fn from(err: surrealdb::Error) -> Self {
        AppError::VectorStore(err.to_string())
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}
