//! Timeout, bounded retry with backoff, and cancellation at the capability
//! boundary.

use crate::capability::{CapabilityError, CapabilityResult};
use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How capability calls are bounded
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Retries without waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Exponential delay before attempt `attempt + 1`, without jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Base delay with +/-25% jitter
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt).as_millis() as u64;
        let spread = base / 4;
        if spread == 0 {
            return Duration::from_millis(base);
        }
        let jittered = rand::random_range(base - spread..=base + spread);
        Duration::from_millis(jittered)
    }

    /// Run `op` until it succeeds, fails permanently, runs out of attempts,
    /// or `cancel` fires. Each attempt is bounded by [`RetryPolicy::timeout`].
    pub async fn call<T, F, Fut>(
        &self,
        capability: &'static str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CapabilityResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled { capability }),
                r = tokio::time::timeout(self.timeout, op()) => r,
            };

            let err = match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => CapabilityError::Timeout,
            };

            if !err.is_retryable() || attempt >= self.max_attempts {
                warn!(capability, attempt, error = %err, "capability call failed");
                return Err(match err {
                    CapabilityError::Timeout => Error::Timeout {
                        capability,
                        after: self.timeout,
                    },
                    other => Error::Capability {
                        capability,
                        message: other.to_string(),
                    },
                });
            }

            let delay = self.backoff(attempt);
            debug!(capability, attempt, ?delay, error = %err, "retrying capability call");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled { capability }),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_base_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.base_delay(1), Duration::from_millis(100));
        assert_eq!(policy.base_delay(2), Duration::from_millis(200));
        assert_eq!(policy.base_delay(3), Duration::from_millis(350));
        assert_eq!(policy.base_delay(40), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(3);
        let out = policy
            .call("embed", &CancellationToken::new(), || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(CapabilityError::RateLimited)
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();
        assert_eq!(out, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(2);
        let err = policy
            .call("embed", &CancellationToken::new(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(CapabilityError::Transport("refused".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Capability { capability: "embed", .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(5);
        let result = policy
            .call("arbitrate", &CancellationToken::new(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(CapabilityError::Http { status: 401, message: "bad key".into() })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempt_timeout() {
        let policy = RetryPolicy {
            timeout: Duration::from_millis(10),
            ..RetryPolicy::immediate(1)
        };
        let err = policy
            .call("convert", &CancellationToken::new(), || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(1.0)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { capability: "convert", .. }));
    }

    #[tokio::test]
    async fn test_cancellation_is_failure() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = RetryPolicy::default()
            .call("embed", &cancel, || async { Ok(1) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled { capability: "embed" }));
        assert!(err.is_capability_failure());
    }
}
