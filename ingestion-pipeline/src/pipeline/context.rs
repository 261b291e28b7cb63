use chrono::{DateTime, Utc};
use common::error::AppError;
use tracing::error;

use crate::utils::chunking::Chunk;

use super::{config::IngestionConfig, services::PipelineServices};

pub struct PipelineContext<'a> {
    pub pipeline_config: &'a IngestionConfig,
    pub services: &'a PipelineServices,
    /// Shared by every record id of this ingestion.
    pub ingestion_timestamp: DateTime<Utc>,
    pub source_name: Option<String>,
    pub text: Option<String>,
    pub chunks: Vec<Chunk>,
    pub committed: usize,
    pub batches: usize,
}

impl<'a> PipelineContext<'a> {
    pub fn new(pipeline_config: &'a IngestionConfig, services: &'a PipelineServices) -> Self {
        Self {
            pipeline_config,
            services,
            ingestion_timestamp: Utc::now(),
            source_name: None,
            text: None,
            chunks: Vec::new(),
            committed: 0,
            batches: 0,
        }
    }

    pub fn source_name(&self) -> Result<&str, AppError> {
        self.source_name
            .as_deref()
            .ok_or_else(|| AppError::InternalError("source name expected to be available".into()))
    }

    pub fn take_text(&mut self) -> Result<String, AppError> {
        self.text
            .take()
            .ok_or_else(|| AppError::InternalError("extracted text expected to be available".into()))
    }

    /// Id of the record for the chunk at `global_index`: unique per ingestion, never
    /// derived from content.
    pub fn record_id(&self, global_index: usize) -> Result<String, AppError> {
        Ok(format!(
            "{}-{}-{global_index}",
            self.source_name()?,
            self.ingestion_timestamp.timestamp_millis()
        ))
    }

    pub fn abort(&mut self, err: AppError) -> AppError {
        error!(
            source = self.source_name.as_deref().unwrap_or("<unknown>"),
            committed = self.committed,
            error = %err,
            "ingestion pipeline aborted"
        );
        err
    }
}
