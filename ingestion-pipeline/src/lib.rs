#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod pipeline;
pub mod utils;

pub use pipeline::{
    DocumentUpload, IngestionConfig, IngestionPipeline, IngestionReport, IngestionRequest,
    IngestionTuning, PipelineServices,
};
pub use utils::{
    chunking::{chunk_text, Chunk},
    pdf_ingestion::PdfTextExtractor,
    text_extraction::TextExtractor,
};
