use std::{future::Future, time::Duration};

use crate::error::AppError;

/// Bounds a remote call, turning expiry into `AppError::Timeout` for `service`.
pub async fn with_deadline<T, F>(
    service: &'static str,
    after: Duration,
    call: F,
) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(after, call).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout { service, after }),
    }
}
