//! Client-side deadlines for adapter calls
//!
//! Expiry abandons the wait only. Work already submitted to the backend is
//! not cancelled.

use std::future::Future;
use std::time::Duration;
use vectorhub_core::{VectorError, VectorResult};

/// Run `fut`, failing with `Timeout` if it does not finish within `limit`
pub async fn with_deadline<T, F>(operation: &str, limit: Duration, fut: F) -> VectorResult<T>
where
    F: Future<Output = VectorResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, after_ms = limit.as_millis() as u64, "backend call timed out");
            Err(VectorError::Timeout {
                operation: operation.to_string(),
                after_ms: limit.as_millis() as u64,
            })
        }
    }
}
