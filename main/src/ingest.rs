use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::Parser;
use common::{error::AppError, storage::backend::IndexSetup, utils::config::get_config};
use doc_chat::{batch::ingest_directory, init_tracing, Runtime};
use ingestion_pipeline::{IngestionConfig, IngestionTuning};
use tracing::{error, info};

/// Ingests every PDF in a directory into the configured vector index.
#[derive(Debug, Parser)]
#[command(name = "ingest")]
struct Args {
    /// Directory containing the PDF documents
    #[arg(long, default_value = "./documents")]
    dir: PathBuf,

    /// Window length in characters
    #[arg(long, default_value_t = 1_000)]
    chunk_size: usize,

    /// Characters shared by consecutive windows
    #[arg(long, default_value_t = 200)]
    chunk_overlap: usize,

    /// Chunks per embedding request and per upsert
    #[arg(long, default_value_t = 10)]
    batch_size: usize,
}

impl Args {
    fn tuning(&self) -> Result<IngestionTuning, AppError> {
        let tuning = IngestionTuning {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            batch_size: self.batch_size,
        };
        tuning.validate()?;
        Ok(tuning)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let args = Args::parse();
    let tuning = args.tuning().context("invalid ingestion settings")?;

    let config = get_config().context("loading configuration")?;
    let runtime = Runtime::connect(&config, IndexSetup::Provision)
        .await
        .context("connecting the vector index")?;

    let pipeline = runtime.ingestion_pipeline(&config, IngestionConfig { tuning });

    let summary = ingest_directory(&pipeline, &args.dir, &config.admin_password)
        .await
        .with_context(|| format!("reading {}", args.dir.display()))?;

    info!(
        documents = summary.ingested.len(),
        chunks = summary.chunk_count(),
        failed = summary.failed.len(),
        "Ingestion finished"
    );

    if summary.failed.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        for (path, err) in &summary.failed {
            error!(file = %path.display(), error = %err, "Not ingested");
        }
        Ok(ExitCode::FAILURE)
    }
}
