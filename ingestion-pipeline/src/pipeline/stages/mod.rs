use common::{
    error::AppError,
    storage::vector_index::{IndexedRecord, RecordMetadata},
    utils::embedding::check_embeddings,
};
use state_machines::core::GuardError;
use tracing::{debug, instrument};

use super::{
    context::PipelineContext,
    state::{Authenticated, Chunked, Extracted, Indexed, IngestionMachine, Ready},
    DocumentUpload,
};
use crate::utils::chunking::{chunk_text, Chunk};

/// Rejects the caller before any extraction, embedding or index traffic happens.
#[instrument(level = "trace", skip_all)]
pub fn authenticate(
    machine: IngestionMachine<(), Ready>,
    ctx: &mut PipelineContext<'_>,
    credential: Option<&str>,
) -> Result<IngestionMachine<(), Authenticated>, AppError> {
    ctx.services.admin_secret.verify(credential)?;

    machine
        .authenticate()
        .map_err(|(_, guard)| map_guard_error("authenticate", &guard))
}

#[instrument(level = "trace", skip_all)]
pub async fn extract_text(
    machine: IngestionMachine<(), Authenticated>,
    ctx: &mut PipelineContext<'_>,
    upload: Option<DocumentUpload>,
) -> Result<IngestionMachine<(), Extracted>, AppError> {
    let DocumentUpload { source_name, bytes } =
        upload.ok_or_else(|| AppError::Validation("No file uploaded".into()))?;
    ctx.source_name = Some(source_name);

    let byte_len = bytes.len();
    let text = ctx.services.extractor.extract(bytes).await?;
    if text.trim().is_empty() {
        return Err(AppError::EmptyDocument);
    }

    let preview: String = text.chars().take(120).collect();
    debug!(
        source = ctx.source_name()?,
        bytes = byte_len,
        text_chars = text.chars().count(),
        preview = %preview.replace('\n', " "),
        "document text extracted"
    );

    ctx.text = Some(text);

    machine
        .extract()
        .map_err(|(_, guard)| map_guard_error("extract", &guard))
}

#[instrument(level = "trace", skip_all)]
pub fn split_text(
    machine: IngestionMachine<(), Extracted>,
    ctx: &mut PipelineContext<'_>,
) -> Result<IngestionMachine<(), Chunked>, AppError> {
    let tuning = ctx.pipeline_config.tuning.clone();
    tuning.validate()?;
    let text = ctx.take_text()?;
    let chunks = chunk_text(&text, tuning.chunk_size, tuning.chunk_overlap)?;
    if chunks.is_empty() {
        return Err(AppError::EmptyDocument);
    }

    debug!(
        source = ctx.source_name()?,
        chunk_count = chunks.len(),
        chunk_size = tuning.chunk_size,
        chunk_overlap = tuning.chunk_overlap,
        "document chunked"
    );

    ctx.chunks = chunks;

    machine
        .split()
        .map_err(|(_, guard)| map_guard_error("split", &guard))
}

/// Embeds and upserts the chunks one batch at a time, in order. A failing batch stops the
/// stage; records of earlier batches stay in the index and are reported as committed.
#[instrument(level = "trace", skip_all)]
pub async fn embed_and_index(
    machine: IngestionMachine<(), Chunked>,
    ctx: &mut PipelineContext<'_>,
) -> Result<IngestionMachine<(), Indexed>, AppError> {
    let chunks = std::mem::take(&mut ctx.chunks);
    let batch_size = ctx.pipeline_config.tuning.batch_size;

    for batch in chunks.chunks(batch_size) {
        if let Err(source) = index_batch(ctx, batch).await {
            return Err(AppError::Interrupted {
                committed: ctx.committed,
                source: Box::new(source),
            });
        }
    }

    machine
        .index()
        .map_err(|(_, guard)| map_guard_error("index", &guard))
}

async fn index_batch(ctx: &mut PipelineContext<'_>, batch: &[Chunk]) -> Result<(), AppError> {
    let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();

    let vectors = ctx.services.embedding.embed(&texts).await?;
    check_embeddings(texts.len(), ctx.services.embedding.dimension(), &vectors)?;

    let source = ctx.source_name()?.to_string();
    let records = batch
        .iter()
        .zip(vectors)
        .map(|(chunk, vector)| {
            Ok(IndexedRecord {
                id: ctx.record_id(chunk.index)?,
                vector,
                metadata: RecordMetadata {
                    text: chunk.text.clone(),
                    source: source.clone(),
                },
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    ctx.services.index.upsert(records).await?;

    ctx.committed += batch.len();
    ctx.batches += 1;
    debug!(
        source = %source,
        batch = ctx.batches,
        first_index = batch.first().map_or(0, |chunk| chunk.index),
        batch_len = batch.len(),
        committed = ctx.committed,
        "batch upserted"
    );

    Ok(())
}

fn map_guard_error(event: &str, guard: &GuardError) -> AppError {
    AppError::InternalError(format!(
        "invalid ingestion pipeline transition during {event}: {guard:?}"
    ))
}
