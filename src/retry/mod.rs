//! Retry & backoff controller
//!
//! Wraps a unit of work with bounded retries and exponential delay:
//! - `RetryPolicy` - backoff constants (`base * 2^(n-2)`, capped)
//! - `PayloadError` / `FailureKind` - transient vs permanent classification
//! - `run_with_retry` - drives attempts under a per-attempt hard timeout

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Failure classification
///
/// Only transient failures are retried; permanent failures terminate on the
/// attempt that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Timeout, resource-temporarily-unavailable, spawn failure
    Transient,
    /// Validation failure or explicit rejection by payload logic
    Permanent,
}

/// Failure reported by a payload executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadError {
    /// Whether the failure is worth retrying
    pub kind: FailureKind,
    /// Human-readable failure message
    pub message: String,
}

impl PayloadError {
    /// A retryable failure
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
        }
    }

    /// A terminal failure, never retried
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Permanent,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for PayloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for PayloadError {}

/// Exponential backoff constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the second attempt
    pub base: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy from base delay and cap
    pub fn new(base: Duration, max_delay: Duration) -> Self {
        Self { base, max_delay }
    }

    /// Delay inserted before attempt `n`
    ///
    /// Zero for the first attempt; `base * 2^(n-2)` capped at `max_delay`
    /// for n >= 2.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exp = (attempt - 2).min(16);
        let delay = self.base.saturating_mul(2u32.saturating_pow(exp));
        delay.min(self.max_delay)
    }

    /// Total worst-case delay across `max_attempts` attempts
    pub fn total_delay(&self, max_attempts: u32) -> Duration {
        (2..=max_attempts).map(|n| self.delay_before(n)).sum()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(2))
    }
}

/// Terminal outcome of a retried unit of work
#[derive(Debug, Clone)]
pub enum RetryOutcome {
    /// An attempt completed successfully
    Succeeded {
        /// Attempts consumed
        attempts: u32,
        /// Output of the successful attempt
        output: Value,
    },
    /// Permanent failure, or transient failures exhausted all attempts
    Failed {
        /// Attempts consumed
        attempts: u32,
        /// The last failure message
        error: String,
    },
    /// The final attempt exceeded the timeout budget
    TimedOut {
        /// Attempts consumed
        attempts: u32,
    },
    /// Cancelled mid-attempt or mid-backoff
    Cancelled {
        /// Attempts consumed
        attempts: u32,
    },
}

enum AttemptFailure {
    Timeout,
    Transient(String),
}

/// Run a unit of work with bounded retries and exponential backoff
///
/// Each attempt gets a hard timeout of `budget`; the in-flight future is
/// dropped on expiry. Timeouts count as transient. Cancellation is honored
/// between and during attempts.
pub async fn run_with_retry<F, Fut>(
    policy: RetryPolicy,
    max_attempts: u32,
    budget: Duration,
    cancel: &CancellationToken,
    mut make_attempt: F,
) -> RetryOutcome
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Value, PayloadError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1u32;

    loop {
        let work = make_attempt(attempt);
        let result = tokio::select! {
            _ = cancel.cancelled() => return RetryOutcome::Cancelled { attempts: attempt },
            r = timeout(budget, work) => r,
        };

        let failure = match result {
            Ok(Ok(output)) => {
                return RetryOutcome::Succeeded {
                    attempts: attempt,
                    output,
                }
            }
            Ok(Err(err)) if err.kind == FailureKind::Permanent => {
                return RetryOutcome::Failed {
                    attempts: attempt,
                    error: err.message,
                }
            }
            Ok(Err(err)) => AttemptFailure::Transient(err.message),
            Err(_) => AttemptFailure::Timeout,
        };

        if attempt >= max_attempts {
            return match failure {
                AttemptFailure::Timeout => RetryOutcome::TimedOut { attempts: attempt },
                AttemptFailure::Transient(error) => RetryOutcome::Failed {
                    attempts: attempt,
                    error,
                },
            };
        }

        let delay = policy.delay_before(attempt + 1);
        match &failure {
            AttemptFailure::Timeout => {
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "attempt timed out, backing off")
            }
            AttemptFailure::Transient(error) => {
                tracing::debug!(attempt, error = %error, delay_ms = delay.as_millis() as u64, "transient failure, backing off")
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return RetryOutcome::Cancelled { attempts: attempt },
            _ = tokio::time::sleep(delay) => {}
        }

        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn policy_ms(base: u64, cap: u64) -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(base), Duration::from_millis(cap))
    }

    #[test]
    fn test_delay_schedule() {
        let policy = policy_ms(100, 2000);
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_millis(100));
        assert_eq!(policy.delay_before(3), Duration::from_millis(200));
        assert_eq!(policy.delay_before(4), Duration::from_millis(400));
        // Capped
        assert_eq!(policy.delay_before(8), Duration::from_millis(2000));
    }

    #[test]
    fn test_total_delay() {
        let policy = policy_ms(100, 2000);
        // 100 + 200 + 400
        assert_eq!(policy.total_delay(4), Duration::from_millis(700));
        assert_eq!(policy.total_delay(1), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let cancel = CancellationToken::new();
        let outcome = run_with_retry(
            policy_ms(10, 100),
            3,
            Duration::from_secs(1),
            &cancel,
            |_| async { Ok(json!({"ok": true})) },
        )
        .await;

        assert!(matches!(outcome, RetryOutcome::Succeeded { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let cancel = CancellationToken::new();

        let outcome = run_with_retry(
            policy_ms(10, 100),
            5,
            Duration::from_secs(1),
            &cancel,
            move |_| {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(PayloadError::permanent("rejected by policy"))
                }
            },
        )
        .await;

        assert!(
            matches!(outcome, RetryOutcome::Failed { attempts: 1, ref error } if error == "rejected by policy")
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_exhausts_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let cancel = CancellationToken::new();

        let start = Instant::now();
        let outcome = run_with_retry(
            policy_ms(20, 200),
            3,
            Duration::from_secs(1),
            &cancel,
            move |_| {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(PayloadError::transient("busy"))
                }
            },
        )
        .await;
        let elapsed = start.elapsed();

        assert!(matches!(outcome, RetryOutcome::Failed { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Backoff before attempts 2 and 3: 20ms + 40ms
        assert!(elapsed >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_timeout_counts_as_transient_then_terminal() {
        let cancel = CancellationToken::new();
        let outcome = run_with_retry(
            policy_ms(5, 50),
            2,
            Duration::from_millis(20),
            &cancel,
            |_| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(json!(null))
            },
        )
        .await;

        assert!(matches!(outcome, RetryOutcome::TimedOut { attempts: 2 }));
    }

    #[tokio::test]
    async fn test_recovery_after_transient_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let cancel = CancellationToken::new();

        let outcome = run_with_retry(
            policy_ms(5, 50),
            3,
            Duration::from_secs(1),
            &cancel,
            move |attempt| {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    if attempt < 3 {
                        Err(PayloadError::transient("not yet"))
                    } else {
                        Ok(json!("done"))
                    }
                }
            },
        )
        .await;

        assert!(matches!(outcome, RetryOutcome::Succeeded { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancellation_during_backoff() {
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            cancel_clone.cancel();
        });

        let outcome = run_with_retry(
            policy_ms(5000, 10000),
            3,
            Duration::from_secs(1),
            &cancel,
            |_| async { Err(PayloadError::transient("busy")) },
        )
        .await;

        assert!(matches!(outcome, RetryOutcome::Cancelled { .. }));
    }
}
