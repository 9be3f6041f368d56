//! Bounded retry with exponential backoff.
//!
//! Every request to the API goes through [`with_retry`] or [`with_retry_when`]. Rate limiting
//! (HTTP 429), server errors and connection failures are retried; everything else is returned
//! straight away.
use crate::config::RetryPolicy;
use crate::error::ApiError;
use std::future::Future;
use std::time::Duration;

pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, operation: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    with_retry_when(policy, ApiError::is_retryable, operation).await
}

/// Like [`with_retry`], but only errors accepted by `should_retry` are attempted again.
pub async fn with_retry_when<F, Fut, T, R>(
    policy: &RetryPolicy,
    should_retry: R,
    mut operation: F,
) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
    R: Fn(&ApiError) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    let mut delay = policy.initial_delay.min(policy.max_delay);

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(attempts = attempt, "Request succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if should_retry(&e) && attempt < max_attempts => {
                let wait = retry_wait(policy, delay, &e);

                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts,
                    delay_ms = wait.as_millis() as u64,
                    "Request failed, retrying"
                );

                tokio::time::sleep(wait).await;
                attempt += 1;
                delay = next_delay(policy, delay);
            }
            Err(e) => {
                if should_retry(&e) {
                    tracing::error!(error = %e, attempts = attempt, "Retry attempts exhausted");
                }
                return Err(e);
            }
        }
    }
}

/// The backoff delay, or the server's `Retry-After` when that is longer. Never above `max_delay`.
fn retry_wait(policy: &RetryPolicy, delay: Duration, error: &ApiError) -> Duration {
    error
        .retry_after()
        .map_or(delay, |requested| requested.max(delay))
        .min(policy.max_delay)
}

fn next_delay(policy: &RetryPolicy, delay: Duration) -> Duration {
    Duration::from_secs_f64(delay.as_secs_f64() * policy.backoff_multiplier).min(policy.max_delay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn test_delay_grows_and_is_capped() {
        let policy = RetryPolicy::default();
        let mut delay = policy.initial_delay;
        let mut seen = vec![];
        for _ in 0..6 {
            seen.push(delay.as_secs());
            delay = next_delay(&policy, delay);
        }
        assert_eq!(seen, vec![1, 2, 4, 8, 10, 10]);
    }

    #[test]
    fn test_retry_after_overrides_shorter_backoff() {
        let policy = RetryPolicy::default();
        let limited = |secs| ApiError::RateLimited {
            retry_after: Some(Duration::from_secs(secs)),
        };

        assert_eq!(
            retry_wait(&policy, Duration::from_secs(1), &limited(4)),
            Duration::from_secs(4)
        );
        // shorter than the backoff: backoff wins
        assert_eq!(
            retry_wait(&policy, Duration::from_secs(8), &limited(2)),
            Duration::from_secs(8)
        );
        // capped at max_delay
        assert_eq!(
            retry_wait(&policy, Duration::from_secs(1), &limited(120)),
            Duration::from_secs(10)
        );
        let no_header = ApiError::RateLimited { retry_after: None };
        assert_eq!(
            retry_wait(&policy, Duration::from_secs(2), &no_header),
            Duration::from_secs(2)
        );
    }

    #[tokio::test]
    async fn test_retry_after_delays_the_next_attempt() {
        let policy = RetryPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
        };
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let started = std::time::Instant::now();
        let result = with_retry(&policy, || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ApiError::RateLimited {
                        retry_after: Some(Duration::from_millis(80)),
                    })
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_custom_classification_limits_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let only_rate_limits = |e: &ApiError| matches!(e, ApiError::RateLimited { .. });
        let result: Result<(), _> = with_retry_when(&fast_policy(5), only_rate_limits, || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::Status {
                    status: StatusCode::BAD_GATEWAY,
                    body: String::new(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(ApiError::Status { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = with_retry(&fast_policy(5), || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ApiError::RateLimited { retry_after: None })
                } else {
                    Ok("page")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "page");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = with_retry(&fast_policy(3), || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::RateLimited {
                    retry_after: Some(Duration::from_secs(60)),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(ApiError::RateLimited { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = with_retry(&fast_policy(5), || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::Status {
                    status: StatusCode::BAD_REQUEST,
                    body: "invalid filter".to_string(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(ApiError::Status { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = with_retry(&fast_policy(0), || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ApiError>(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
