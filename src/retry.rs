use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::errors::{ServiceError, TransientKind};
use crate::metrics;

/// Floor applied after jitter so a tiny base delay can never turn into a
/// hot loop against the payment API.
pub const MIN_BACKOFF: Duration = Duration::from_millis(100);

/// Jitter spread: sleeps land uniformly within ±25% of the computed delay.
pub const JITTER_RATIO: f64 = 0.25;

/// Retry schedule plus the transient classes it is willing to retry.
/// Anything outside `retry_on` short-circuits on the first failure.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    pub retry_on: &'static [TransientKind],
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl RetryPolicy {
    /// Default policy for gateway and pipeline operations: network resets,
    /// timeouts, DNS failures, and provider rate limits only.
    pub fn standard() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            exponential_base: 2.0,
            retry_on: &[
                TransientKind::NetworkReset,
                TransientKind::Timeout,
                TransientKind::Dns,
                TransientKind::RateLimit,
            ],
        }
    }

    /// Policy for the inventory compare-and-swap cycle. Version conflicts
    /// are expected under concurrent checkouts, so the schedule is longer
    /// and conflicts count as retryable.
    pub fn inventory() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            exponential_base: 2.0,
            retry_on: &[
                TransientKind::NetworkReset,
                TransientKind::Timeout,
                TransientKind::Dns,
                TransientKind::RateLimit,
                TransientKind::VersionConflict,
            ],
        }
    }

    pub fn should_retry(&self, error: &ServiceError) -> bool {
        error
            .transient_kind()
            .map(|kind| self.retry_on.contains(&kind))
            .unwrap_or(false)
    }

    /// Deterministic delay for a 1-based attempt number:
    /// `min(base * exponential_base^(attempt-1), max_delay)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = self.base_delay.as_secs_f64() * self.exponential_base.powi(exponent);
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }

    /// The delay actually slept: deterministic backoff with uniform ±25%
    /// jitter, floored at [`MIN_BACKOFF`].
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        self.jittered_delay_with(attempt, &mut rand::thread_rng())
    }

    pub fn jittered_delay_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base = self.backoff_delay(attempt).as_secs_f64();
        let factor = rng.gen_range((1.0 - JITTER_RATIO)..=(1.0 + JITTER_RATIO));
        Duration::from_secs_f64(base * factor).max(MIN_BACKOFF)
    }
}

/// Execute an async operation under a retry policy.
///
/// Attempt numbers are 1-based in every log line. Non-retryable failures
/// and exhausted schedules return the last error unchanged.
pub async fn execute<F, Fut, T>(
    operation: &str,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let started = Instant::now();
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation,
                        attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "operation succeeded after retries"
                    );
                } else {
                    debug!(
                        operation,
                        attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "operation succeeded"
                    );
                }
                return Ok(value);
            }
            Err(err) => {
                let retryable = policy.should_retry(&err);
                if !retryable || attempt >= policy.max_attempts {
                    metrics::increment_counter("settlement_retries_exhausted_total");
                    error!(
                        operation,
                        attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        category = err.category().as_str(),
                        retryable,
                        error = %err,
                        "operation failed; giving up"
                    );
                    return Err(err);
                }

                let delay = policy.jittered_delay(attempt);
                metrics::increment_counter("settlement_retry_attempts_total");
                warn!(
                    operation,
                    attempt,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "attempt failed; retrying"
                );
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn conflict() -> ServiceError {
        ServiceError::VersionConflict {
            product_id: "prod_1".into(),
        }
    }

    fn timeout() -> ServiceError {
        ServiceError::Transport {
            kind: TransientKind::Timeout,
            detail: "deadline exceeded".into(),
        }
    }

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let policy = RetryPolicy::inventory();
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(2000));
        assert_eq!(policy.backoff_delay(4), Duration::from_millis(4000));
        assert_eq!(policy.backoff_delay(5), Duration::from_millis(8000));
        // Capped from here on
        assert_eq!(policy.backoff_delay(6), Duration::from_secs(8));
        assert_eq!(policy.backoff_delay(12), Duration::from_secs(8));
    }

    #[test]
    fn jitter_stays_within_bounds_and_floor() {
        let policy = RetryPolicy::standard();
        let mut rng = StdRng::seed_from_u64(42);
        for attempt in 1..=6 {
            let base = policy.backoff_delay(attempt).as_secs_f64();
            let jittered = policy.jittered_delay_with(attempt, &mut rng).as_secs_f64();
            assert!(jittered >= (base * 0.75).max(0.1) - 1e-9);
            assert!(jittered <= base * 1.25 + 1e-9);
        }
    }

    #[test]
    fn standard_policy_does_not_retry_version_conflicts() {
        assert!(!RetryPolicy::standard().should_retry(&conflict()));
        assert!(RetryPolicy::inventory().should_retry(&conflict()));
        assert!(RetryPolicy::standard().should_retry(&timeout()));
        assert!(!RetryPolicy::standard().should_retry(&ServiceError::CustomerData("bad".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_makes_one_attempt() {
        let mut calls = 0u32;
        let result = execute("op", &RetryPolicy::standard(), || {
            calls += 1;
            async { Ok::<_, ServiceError>(7) }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_short_circuits() {
        let mut calls = 0u32;
        let result: Result<(), _> = execute("op", &RetryPolicy::standard(), || {
            calls += 1;
            async { Err(ServiceError::EventParsing("broken".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_retry_until_success() {
        let mut calls = 0u32;
        let result = execute("op", &RetryPolicy::inventory(), || {
            calls += 1;
            let attempt = calls;
            async move {
                if attempt < 3 {
                    Err(conflict())
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_schedule_returns_last_error() {
        let mut calls = 0u32;
        let result: Result<(), _> = execute("op", &RetryPolicy::inventory(), || {
            calls += 1;
            async { Err(conflict()) }
        })
        .await;
        match result {
            Err(ServiceError::VersionConflict { product_id }) => {
                assert_eq!(product_id, "prod_1")
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(calls, 5);
    }
}
