use async_trait::async_trait;
use bytes::Bytes;

use common::error::AppError;

/// Turns raw document bytes into plain text.
///
/// Fails with `AppError::Extraction` when the input is malformed, encrypted, or not a
/// document of the expected format. Whitespace-only output is returned as-is; deciding
/// that it is empty belongs to the caller.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, document: Bytes) -> Result<String, AppError>;
}
