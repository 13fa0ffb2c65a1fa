//! Rate-limit retry for upstream calls.
//!
//! Adapters retry exactly once when an upstream signals throttling, after
//! honoring its retry-after hint (or a fixed backoff floor when no hint was
//! sent). Every other error propagates immediately; anything beyond that is
//! the dispatcher caller's decision.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::sources::SourceError;

/// Configuration for rate-limit retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Delay used when the upstream sends no retry-after hint
    pub backoff_floor: Duration,
    /// Longest delay the adapter is willing to wait before retrying
    ///
    /// A longer retry-after hint is not waited out: the rate-limit error
    /// surfaces at once instead of being retried.
    pub max_wait: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            backoff_floor: Duration::from_secs(1),
            max_wait: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    /// Disable retries entirely
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retrying `error`, or `None` if it must not be retried
    pub fn delay_for(&self, error: &SourceError) -> Option<Duration> {
        match error {
            SourceError::RateLimited { retry_after, .. } => {
                let delay = retry_after.unwrap_or(self.backoff_floor);
                (delay <= self.max_wait).then_some(delay)
            }
            _ => None,
        }
    }
}

/// Execute an async operation, retrying on rate limiting only
///
/// Returns the first success, the first non-rate-limit error, or the last
/// rate-limit error once `max_retries` is exhausted.
pub async fn with_rate_limit_retry<T, F, Fut>(
    config: RetryConfig,
    mut operation: F,
) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let mut retries = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if retries > 0 {
                    tracing::info!("Operation succeeded after {} rate-limit retries", retries);
                }
                return Ok(result);
            }
            Err(error) => {
                if retries >= config.max_retries {
                    return Err(error);
                }

                let Some(delay) = config.delay_for(&error) else {
                    if matches!(error, SourceError::RateLimited { .. }) {
                        tracing::warn!("Retry-after hint exceeds maximum wait, not retrying");
                    }
                    return Err(error);
                };

                retries += 1;
                tracing::debug!("{}, retrying in {:?}", error, delay);
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_retries: 1,
            backoff_floor: Duration::from_millis(5),
            max_wait: Duration::from_millis(100),
        }
    }

    #[tokio::test]
    async fn test_success_first_try() {
        let calls = Arc::new(AtomicUsize::new(0));

        let result = with_rate_limit_retry(fast_config(), || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, SourceError>("success")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_single_retry_after_rate_limit() {
        let calls = Arc::new(AtomicUsize::new(0));

        let result = with_rate_limit_retry(fast_config(), || {
            let calls = Arc::clone(&calls);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(SourceError::rate_limited(
                        "429",
                        Some(Duration::from_millis(10)),
                    ))
                } else {
                    Ok("success")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_one_retry() {
        let calls = Arc::new(AtomicUsize::new(0));

        let result: Result<(), _> = with_rate_limit_retry(fast_config(), || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SourceError::rate_limited("429", None))
            }
        })
        .await;

        assert!(matches!(result, Err(SourceError::RateLimited { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_other_errors_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));

        let result: Result<(), _> = with_rate_limit_retry(fast_config(), || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SourceError::Unavailable("connection refused".to_string()))
            }
        })
        .await;

        assert!(matches!(result, Err(SourceError::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hint_beyond_max_wait_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));

        let result: Result<(), _> = with_rate_limit_retry(fast_config(), || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SourceError::rate_limited("429", Some(Duration::from_secs(60))))
            }
        })
        .await;

        assert_eq!(result.unwrap_err().retry_after_secs(), Some(60));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_for() {
        let config = RetryConfig::default();

        assert_eq!(
            config.delay_for(&SourceError::rate_limited("x", None)),
            Some(Duration::from_secs(1))
        );
        assert_eq!(
            config.delay_for(&SourceError::rate_limited("x", Some(Duration::from_secs(4)))),
            Some(Duration::from_secs(4))
        );
        assert_eq!(
            config.delay_for(&SourceError::Malformed("x".to_string())),
            None
        );
        assert_eq!(RetryConfig::none().max_retries, 0);
    }
}
