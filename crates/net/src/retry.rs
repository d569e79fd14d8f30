// Fixed-delay retry for proxy connections: a bounded number of identically
// spaced attempts, no backoff growth.

use crate::error::NetError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retry attempts after the initial try.
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(3),
        }
    }
}

/// Run `operation` until it succeeds, the retry budget is exhausted, or the
/// token fires. Cancellation during a delay surfaces as [`NetError::Cancelled`],
/// never as a generic failure. Each retry logs a progress line.
pub async fn retry_fixed<F, Fut, T>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    operation: F,
) -> Result<T, NetError>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<T, NetError>>,
{
    let mut attempt = 0;
    loop {
        if token.is_cancelled() {
            return Err(NetError::Cancelled);
        }

        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(NetError::Cancelled) => return Err(NetError::Cancelled),
            Err(err) => {
                if attempt >= policy.max_retries {
                    return Err(err);
                }
                attempt += 1;
                warn!(
                    attempt,
                    max = policy.max_retries,
                    error = %err,
                    "connection attempt failed, retrying"
                );
                tokio::select! {
                    _ = token.cancelled() => return Err(NetError::Cancelled),
                    _ = tokio::time::sleep(policy.delay) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn always_failing_operation_tries_exactly_four_times() {
        let attempts = AtomicU32::new(0);
        let token = CancellationToken::new();
        let result: Result<(), _> = retry_fixed(&quick_policy(), &token, |_| {
            attempts.fetch_add(1, Ordering::Relaxed);
            async { Err(NetError::proxy("127.0.0.1", 1080, "refused")) }
        })
        .await;
        assert!(matches!(result, Err(NetError::Proxy { .. })));
        // Initial try + 3 retries.
        assert_eq!(attempts.load(Ordering::Relaxed), 4);
    }

    #[tokio::test]
    async fn success_stops_retrying() {
        let attempts = AtomicU32::new(0);
        let token = CancellationToken::new();
        let result = retry_fixed(&quick_policy(), &token, |attempt| {
            attempts.fetch_add(1, Ordering::Relaxed);
            async move {
                if attempt < 2 {
                    Err(NetError::proxy("127.0.0.1", 1080, "refused"))
                } else {
                    Ok(7u32)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn cancellation_short_circuits() {
        let token = CancellationToken::new();
        token.cancel();
        let result: Result<(), _> =
            retry_fixed(&quick_policy(), &token, |_| async { Ok(()) }).await;
        assert!(matches!(result, Err(NetError::Cancelled)));
    }

    #[tokio::test]
    async fn cancelled_operation_is_not_retried() {
        let attempts = AtomicU32::new(0);
        let token = CancellationToken::new();
        let result: Result<(), _> = retry_fixed(&quick_policy(), &token, |_| {
            attempts.fetch_add(1, Ordering::Relaxed);
            async { Err(NetError::Cancelled) }
        })
        .await;
        assert!(matches!(result, Err(NetError::Cancelled)));
        assert_eq!(attempts.load(Ordering::Relaxed), 1);
    }
}
