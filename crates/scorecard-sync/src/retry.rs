//! Bounded retry with rate-limit-aware backoff
//!
//! Rate-limited responses back off exponentially up to a cap; every other
//! transient failure backs off linearly. Permanent failures (e.g. a rejected
//! API key) are surfaced immediately.

use async_trait::async_trait;
use scorecard_common::{Result, SyncError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

// ============================================================================
// Retry Constants
// ============================================================================

/// Default number of attempts per page request
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Base delay for non-rate-limit failures, multiplied by the attempt number
pub const DEFAULT_TRANSIENT_BASE_MS: u64 = 2_000;

/// Base delay for rate-limited responses, doubled per attempt
pub const DEFAULT_RATE_LIMIT_BASE_MS: u64 = 1_000;

/// Upper bound for any single delay
pub const DEFAULT_RATE_LIMIT_CAP_MS: u64 = 60_000;

/// Failure of a single page request
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("rate limited (HTTP {status})")]
    RateLimited {
        status: u16,
        retry_after: Option<Duration>,
    },

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response body: {0}")]
    Decode(String),
}

impl FetchError {
    /// Whether another attempt could succeed
    ///
    /// Client errors other than 408 are permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => *status == 408 || *status >= 500,
            FetchError::RateLimited { .. } | FetchError::Transport(_) | FetchError::Decode(_) => {
                true
            },
        }
    }
}

/// Attempt budget and delay schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub transient_base: Duration,
    pub rate_limit_base: Duration,
    pub rate_limit_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            transient_base: Duration::from_millis(DEFAULT_TRANSIENT_BASE_MS),
            rate_limit_base: Duration::from_millis(DEFAULT_RATE_LIMIT_BASE_MS),
            rate_limit_cap: Duration::from_millis(DEFAULT_RATE_LIMIT_CAP_MS),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay before the attempt following failed attempt `attempt` (1-based)
    pub fn delay_for(&self, error: &FetchError, attempt: u32) -> Duration {
        match error {
            FetchError::RateLimited {
                retry_after: Some(after),
                ..
            } => (*after).min(self.rate_limit_cap),
            FetchError::RateLimited { .. } => self
                .rate_limit_base
                .saturating_mul(2u32.saturating_pow(attempt))
                .min(self.rate_limit_cap),
            _ => self
                .transient_base
                .saturating_mul(attempt)
                .min(self.rate_limit_cap),
        }
    }
}

/// Suspension point for backoff and pacing delays
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the Tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Runs one logical request under a [`RetryPolicy`]
#[derive(Clone)]
pub struct Retrier {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl Retrier {
    pub fn new(policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { policy, sleeper }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `call` until it succeeds, fails permanently, or the budget is spent
    ///
    /// `call` receives the 1-based attempt number. Terminal failures become
    /// [`SyncError::FetchFailed`] tagged with `page`.
    pub async fn run<T, F, Fut>(&self, page: u32, mut call: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = std::result::Result<T, FetchError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            debug!(page, attempt, max_attempts, "Requesting page");

            let error = match call(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(page, attempt, "Page request recovered after retry");
                    }
                    return Ok(value);
                },
                Err(error) => error,
            };

            if !error.is_retryable() {
                warn!(page, attempt, error = %error, "Page request failed permanently");
                return Err(SyncError::fetch_failed(page, attempt, error.to_string()));
            }

            if attempt >= max_attempts {
                warn!(page, attempt, error = %error, "Retry budget exhausted");
                return Err(SyncError::fetch_failed(page, attempt, error.to_string()));
            }

            let delay = self.policy.delay_for(&error, attempt);
            warn!(
                page,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Page request failed, retrying"
            );
            self.sleeper.sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSleeper {
        delays: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.delays.lock().unwrap().push(duration);
        }
    }

    fn retrier(sleeper: &Arc<RecordingSleeper>) -> Retrier {
        Retrier::new(RetryPolicy::default(), sleeper.clone())
    }

    fn unavailable() -> FetchError {
        FetchError::Status {
            status: 503,
            message: "Service Unavailable".to_string(),
        }
    }

    #[tokio::test]
    async fn test_two_failures_then_success() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut calls = 0;

        let result = retrier(&sleeper)
            .run(3, |attempt| {
                calls += 1;
                async move {
                    if attempt < 3 {
                        Err(unavailable())
                    } else {
                        Ok(vec![1, 2, 3])
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, vec![1, 2, 3]);
        assert_eq!(calls, 3);
        assert_eq!(
            *sleeper.delays.lock().unwrap(),
            vec![Duration::from_millis(2_000), Duration::from_millis(4_000)]
        );
    }

    #[tokio::test]
    async fn test_exhaustion_reports_last_error() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let retrier = Retrier::new(RetryPolicy::default().with_max_attempts(3), sleeper.clone());

        let err = retrier
            .run(8, |_| async { Err::<(), _>(unavailable()) })
            .await
            .unwrap_err();

        match err {
            SyncError::FetchFailed {
                page,
                attempts,
                message,
            } => {
                assert_eq!(page, 8);
                assert_eq!(attempts, 3);
                assert!(message.contains("503"));
            },
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(sleeper.delays.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_permanent_status_is_not_retried() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut calls = 0;

        let err = retrier(&sleeper)
            .run(1, |_| {
                calls += 1;
                async {
                    Err::<(), _>(FetchError::Status {
                        status: 403,
                        message: "API_KEY_INVALID".to_string(),
                    })
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::FetchFailed { attempts: 1, .. }));
        assert_eq!(calls, 1);
        assert!(sleeper.delays.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_sleeper_waits_on_the_timer() {
        let retrier = Retrier::new(RetryPolicy::default(), Arc::new(TokioSleeper));
        let start = tokio::time::Instant::now();

        let result = retrier
            .run(1, |attempt| async move {
                if attempt == 1 {
                    Err(FetchError::Transport("connection reset".into()))
                } else {
                    Ok(attempt)
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 2);
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[test]
    fn test_rate_limit_delay_is_exponential_and_capped() {
        let policy = RetryPolicy::default();
        let limited = FetchError::RateLimited {
            status: 429,
            retry_after: None,
        };

        assert_eq!(policy.delay_for(&limited, 1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(&limited, 3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(&limited, 10), Duration::from_secs(60));
    }

    #[test]
    fn test_retry_after_overrides_but_stays_capped() {
        let policy = RetryPolicy::default();
        let short = FetchError::RateLimited {
            status: 429,
            retry_after: Some(Duration::from_secs(7)),
        };
        let long = FetchError::RateLimited {
            status: 429,
            retry_after: Some(Duration::from_secs(3_600)),
        };

        assert_eq!(policy.delay_for(&short, 1), Duration::from_secs(7));
        assert_eq!(policy.delay_for(&long, 1), Duration::from_secs(60));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(FetchError::Transport("connection reset".into()).is_retryable());
        assert!(FetchError::Decode("EOF".into()).is_retryable());
        assert!(FetchError::Status { status: 408, message: String::new() }.is_retryable());
        assert!(!FetchError::Status { status: 404, message: String::new() }.is_retryable());
    }
}
