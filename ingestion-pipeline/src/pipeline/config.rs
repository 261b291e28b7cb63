use common::error::AppError;

#[derive(Debug, Clone)]
pub struct IngestionTuning {
    /// Window length in chars.
    pub chunk_size: usize,
    /// Chars shared by consecutive windows.
    pub chunk_overlap: usize,
    /// Chunks per embedding request and per upsert.
    pub batch_size: usize,
}

impl Default for IngestionTuning {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            chunk_overlap: 200,
            batch_size: 10,
        }
    }
}

impl IngestionTuning {
    /// Rejects settings no document could be ingested with: an empty window, an overlap
    /// that leaves no progress, or empty batches.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.chunk_size == 0 {
            return Err(AppError::Configuration(
                "chunk_size must be greater than 0".into(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(AppError::Configuration(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.batch_size == 0 {
            return Err(AppError::Configuration(
                "batch_size must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct IngestionConfig {
    pub tuning: IngestionTuning,
}
