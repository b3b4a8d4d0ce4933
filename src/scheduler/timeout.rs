//! Deadline enforcement for a single request.

use std::future::Future;
use std::time::Duration;

use crate::error::{ResilienceError, Result};

/// Races `future` against `duration`.
///
/// On expiry the future is dropped, which cancels any pending retry sleep,
/// and a [`ResilienceError::Timeout`] is returned.
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(ResilienceError::Timeout {
            timeout_ms: duration.as_millis() as u64,
        }),
    }
}
