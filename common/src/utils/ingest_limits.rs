use super::config::AppConfig;
use crate::error::AppError;

/// Rejects uploads whose name or size exceed the configured ingest limits.
pub fn validate_upload(config: &AppConfig, file_name: &str, size: usize) -> Result<(), AppError> {
    if file_name.trim().is_empty() {
        return Err(AppError::Validation("File name must not be empty".into()));
    }

    if file_name.len() > config.ingest_max_file_name_bytes {
        return Err(AppError::Validation(format!(
            "File name is too long. Maximum allowed is {} bytes",
            config.ingest_max_file_name_bytes
        )));
    }

    if size > config.ingest_max_body_bytes {
        return Err(AppError::PayloadTooLarge(format!(
            "Document is too large. Maximum allowed is {} bytes",
            config.ingest_max_body_bytes
        )));
    }

    Ok(())
}
