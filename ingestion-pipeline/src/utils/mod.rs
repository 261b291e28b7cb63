pub mod chunking;
pub mod pdf_ingestion;
pub mod text_extraction;
