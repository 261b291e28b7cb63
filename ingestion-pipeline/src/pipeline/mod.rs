mod config;
mod context;
mod services;
mod stages;
mod state;

pub use config::{IngestionConfig, IngestionTuning};
#[allow(clippy::module_name_repetitions)]
pub use services::PipelineServices;

use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use common::error::AppError;
use serde::Serialize;
use tracing::info;

use self::{
    context::PipelineContext,
    stages::{authenticate, embed_and_index, extract_text, split_text},
    state::ready,
};

/// A document handed to the pipeline, named by its original file name.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub source_name: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, Default)]
pub struct IngestionRequest {
    pub credential: Option<String>,
    pub upload: Option<DocumentUpload>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IngestionReport {
    pub source_name: String,
    pub chunk_count: usize,
    pub batch_count: usize,
    pub ingestion_timestamp: DateTime<Utc>,
}

#[allow(clippy::module_name_repetitions)]
pub struct IngestionPipeline {
    pipeline_config: IngestionConfig,
    services: PipelineServices,
}

impl IngestionPipeline {
    pub fn new(services: PipelineServices) -> Self {
        Self::with_config(services, IngestionConfig::default())
    }

    pub fn with_config(services: PipelineServices, pipeline_config: IngestionConfig) -> Self {
        Self {
            pipeline_config,
            services,
        }
    }

    fn duration_millis(duration: Duration) -> u64 {
        u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
    }

    /// Authenticates, extracts, chunks, then embeds and upserts the document batch by
    /// batch. Nothing is retried; a failure after the first upsert is reported as
    /// `AppError::Interrupted` with the number of chunks already committed.
    #[tracing::instrument(
        skip_all,
        fields(source = request.upload.as_ref().map_or("<missing>", |u| u.source_name.as_str()))
    )]
    pub async fn ingest(&self, request: IngestionRequest) -> Result<IngestionReport, AppError> {
        let IngestionRequest { credential, upload } = request;
        let mut ctx = PipelineContext::new(&self.pipeline_config, &self.services);

        let machine = ready();
        let pipeline_started = Instant::now();

        let machine =
            authenticate(machine, &mut ctx, credential.as_deref()).map_err(|err| ctx.abort(err))?;

        let stage_start = Instant::now();
        let machine = extract_text(machine, &mut ctx, upload)
            .await
            .map_err(|err| ctx.abort(err))?;
        let extract_duration = stage_start.elapsed();

        let stage_start = Instant::now();
        let machine = split_text(machine, &mut ctx).map_err(|err| ctx.abort(err))?;
        let chunk_count = ctx.chunks.len();
        let split_duration = stage_start.elapsed();

        info!(
            source = ctx.source_name()?,
            chunk_count,
            timestamp_ms = ctx.ingestion_timestamp.timestamp_millis(),
            "ingestion started"
        );

        let stage_start = Instant::now();
        let _machine = embed_and_index(machine, &mut ctx)
            .await
            .map_err(|err| ctx.abort(err))?;
        let index_duration = stage_start.elapsed();

        let report = IngestionReport {
            source_name: ctx.source_name()?.to_string(),
            chunk_count,
            batch_count: ctx.batches,
            ingestion_timestamp: ctx.ingestion_timestamp,
        };

        info!(
            source = %report.source_name,
            chunk_count = report.chunk_count,
            batches = report.batch_count,
            total_ms = Self::duration_millis(pipeline_started.elapsed()),
            extract_ms = Self::duration_millis(extract_duration),
            split_ms = Self::duration_millis(split_duration),
            index_ms = Self::duration_millis(index_duration),
            "ingestion pipeline finished"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests;
