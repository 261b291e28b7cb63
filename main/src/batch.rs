use std::path::{Path, PathBuf};

use bytes::Bytes;
use common::error::AppError;
use ingestion_pipeline::{DocumentUpload, IngestionPipeline, IngestionReport, IngestionRequest};
use tracing::{error, info, warn};

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub ingested: Vec<IngestionReport>,
    pub failed: Vec<(PathBuf, AppError)>,
}

impl BatchSummary {
    pub fn chunk_count(&self) -> usize {
        self.ingested.iter().map(|report| report.chunk_count).sum()
    }
}

/// PDF files directly inside `dir`, sorted by name.
pub fn pdf_files_in(dir: &Path) -> Result<Vec<PathBuf>, AppError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_pdf = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if is_pdf && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Ingests every PDF in `dir` one after another. A failing file is logged and recorded,
/// and the remaining files are still processed.
pub async fn ingest_directory(
    pipeline: &IngestionPipeline,
    dir: &Path,
    credential: &str,
) -> Result<BatchSummary, AppError> {
    let files = pdf_files_in(dir)?;
    if files.is_empty() {
        warn!(dir = %dir.display(), "No PDF files found");
    }

    let mut summary = BatchSummary::default();
    for path in files {
        match ingest_file(pipeline, &path, credential).await {
            Ok(report) => {
                info!(
                    file = %path.display(),
                    chunks = report.chunk_count,
                    batches = report.batch_count,
                    "Ingested document"
                );
                summary.ingested.push(report);
            }
            Err(err) => {
                error!(file = %path.display(), error = %err, "Failed to ingest document");
                summary.failed.push((path, err));
            }
        }
    }

    Ok(summary)
}

async fn ingest_file(
    pipeline: &IngestionPipeline,
    path: &Path,
    credential: &str,
) -> Result<IngestionReport, AppError> {
    let bytes = tokio::fs::read(path).await?;
    let source_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| AppError::Validation(format!("{} has no file name", path.display())))?;

    pipeline
        .ingest(IngestionRequest {
            credential: Some(credential.to_string()),
            upload: Some(DocumentUpload {
                source_name,
                bytes: Bytes::from(bytes),
            }),
        })
        .await
}
