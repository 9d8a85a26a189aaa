//! Retry policy for source fetches: exponential backoff (1s, 2s, 4s), at
//! most three attempts, honoring a server-provided retry-after.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::common::error::{PipelineError, Result};
use crate::observability::metrics;

pub const MAX_ATTEMPTS: u32 = 3;

pub async fn with_backoff<T, F, Fut>(
    source_name: &str,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retriable() && attempt + 1 < MAX_ATTEMPTS && !cancel.is_cancelled() => {
                let delay = match &e {
                    PipelineError::RateLimited {
                        retry_after: Some(seconds),
                        ..
                    } => Duration::from_secs(*seconds),
                    _ => Duration::from_secs(1 << attempt),
                };
                warn!(
                    source = source_name,
                    attempt = attempt + 1,
                    delay_secs = delay.as_secs(),
                    error = %e,
                    "retriable fetch failure, backing off"
                );
                metrics::sources::fetch_retry(source_name);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(e),
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retries_retriable_errors_up_to_three_attempts() {
        let attempts = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let result: Result<()> = with_backoff("test", &cancel, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                let _ = n;
                Err(PipelineError::NetworkTimeout {
                    source_name: "test".to_string(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn data_errors_are_not_retried() {
        let attempts = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let result: Result<()> = with_backoff("test", &cancel, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async {
                Err(PipelineError::Parse {
                    message: "bad record".to_string(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failure() {
        let attempts = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let result = with_backoff("test", &cancel, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(PipelineError::NetworkTimeout {
                        source_name: "test".to_string(),
                    })
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
    }
}
