//! Retry policy value object and backoff computation.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::error::ServiceError;

/// Jitter added on top of the computed delay, as a fraction of it.
pub const JITTER_FRACTION: f64 = 0.1;

/// Growth of the delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffKind {
    Fixed,
    Linear,
    Exponential,
}

/// Decides whether a failed attempt may be retried.
pub type RetryPredicate = Arc<dyn Fn(&ServiceError) -> bool + Send + Sync>;

// == Retry Policy ==
/// How many times to retry and how long to wait in between.
#[derive(Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub backoff: BackoffKind,
    pub max_delay: Duration,
    pub retry_predicate: RetryPredicate,
}

impl RetryPolicy {
    /// Creates a policy using [`ServiceError::is_retryable`] as predicate.
    pub fn new(max_retries: u32, base_delay: Duration, backoff: BackoffKind, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            backoff,
            max_delay,
            retry_predicate: Arc::new(ServiceError::is_retryable),
        }
    }

    /// A policy that runs the operation exactly once.
    pub fn no_retry() -> Self {
        Self::new(0, Duration::ZERO, BackoffKind::Fixed, Duration::ZERO)
    }

    /// Replaces the retry predicate.
    pub fn with_predicate(mut self, predicate: impl Fn(&ServiceError) -> bool + Send + Sync + 'static) -> Self {
        self.retry_predicate = Arc::new(predicate);
        self
    }

    pub fn should_retry(&self, error: &ServiceError) -> bool {
        (self.retry_predicate)(error)
    }

    // == Delay ==
    /// Delay before the retry that follows failed attempt `attempt`
    /// (0-based): the backoff formula plus up to 10% jitter, capped at
    /// `max_delay`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay_for(attempt);
        let jitter_max = base.as_secs_f64() * JITTER_FRACTION;
        let jitter = if jitter_max > 0.0 {
            Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..jitter_max))
        } else {
            Duration::ZERO
        };
        (base + jitter).min(self.max_delay)
    }

    /// Backoff formula without jitter or cap.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let ms = match self.backoff {
            BackoffKind::Fixed => base_ms,
            BackoffKind::Linear => base_ms.saturating_mul(u64::from(attempt) + 1),
            BackoffKind::Exponential => {
                base_ms.saturating_mul(2u64.saturating_pow(attempt.min(63)))
            }
        };
        Duration::from_millis(ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            3,
            Duration::from_millis(1000),
            BackoffKind::Exponential,
            Duration::from_millis(10_000),
        )
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("backoff", &self.backoff)
            .field("max_delay", &self.max_delay)
            .finish_non_exhaustive()
    }
}
