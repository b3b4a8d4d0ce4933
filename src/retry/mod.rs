//! Retry Controller
//!
//! Runs one asynchronous operation with bounded retries, computing the
//! backoff between attempts and consulting the policy's predicate to
//! decide whether an error is worth another attempt. No caching or
//! admission logic lives here.

mod policy;

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{ResilienceError, Result, ServiceError};

pub use policy::{BackoffKind, RetryPolicy, RetryPredicate, JITTER_FRACTION};

// == Retry Controller ==
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryController;

impl RetryController {
    pub fn new() -> Self {
        Self
    }

    /// Executes `operation` under `policy`.
    ///
    /// Non-retryable errors are returned as [`ResilienceError::Service`]
    /// straight away; running out of attempts yields
    /// [`ResilienceError::RetryExhausted`] carrying the last error.
    pub async fn execute<F, Fut, T>(&self, operation: F, policy: &RetryPolicy) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, ServiceError>>,
    {
        self.execute_with(operation, policy, &mut ()).await
    }

    /// Like [`execute`](Self::execute), reporting each attempt and each
    /// scheduled retry to `observer`.
    ///
    /// `on_attempt` fires right before the operation is invoked, so for
    /// retries it fires after the backoff sleep has elapsed.
    pub async fn execute_with<F, Fut, T, O>(&self, mut operation: F, policy: &RetryPolicy, observer: &mut O) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, ServiceError>>,
        O: RetryObserver + ?Sized,
    {
        let mut attempt: u32 = 0;
        loop {
            observer.on_attempt(attempt);
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if !policy.should_retry(&error) {
                        debug!(attempt, error = %error, "Error is not retryable");
                        return Err(ResilienceError::Service(error));
                    }
                    if attempt >= policy.max_retries {
                        warn!(attempts = attempt + 1, error = %error, "Retries exhausted");
                        return Err(ResilienceError::RetryExhausted {
                            attempts: attempt + 1,
                            last: error,
                        });
                    }

                    let delay = policy.delay(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Operation failed, retrying"
                    );
                    observer.on_retry(attempt, &error, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

// == Retry Observer ==
/// Hooks into the retry loop. Both methods default to no-ops.
pub trait RetryObserver {
    /// Attempt `attempt` (zero-based) is about to run.
    fn on_attempt(&mut self, _attempt: u32) {}

    /// Attempt `attempt` failed with `error`; the next one starts after `delay`.
    fn on_retry(&mut self, _attempt: u32, _error: &ServiceError, _delay: Duration) {}
}

impl RetryObserver for () {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_retries,
            Duration::from_millis(100),
            BackoffKind::Exponential,
            Duration::from_millis(1000),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_runs_max_retries_plus_one() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<()> = RetryController::new()
            .execute(
                || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err(ServiceError::Network("refused".to_string())) }
                },
                &fast_policy(2),
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            result.unwrap_err(),
            ResilienceError::RetryExhausted {
                attempts: 3,
                last: ServiceError::Network("refused".to_string()),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = RetryController::new()
            .execute(
                || {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            Err(ServiceError::HttpStatus {
                                status: 503,
                                message: "busy".to_string(),
                            })
                        } else {
                            Ok(n)
                        }
                    }
                },
                &fast_policy(3),
            )
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_error_fails_fast() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<()> = RetryController::new()
            .execute(
                || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err(ServiceError::HttpStatus { status: 401, message: "unauthorized".to_string() }) }
                },
                &fast_policy(5),
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result,
            Err(ResilienceError::Service(ServiceError::HttpStatus { status: 401, .. }))
        ));
    }

    #[derive(Default)]
    struct Delays(Vec<(u32, Duration)>);

    impl RetryObserver for Delays {
        fn on_retry(&mut self, attempt: u32, _error: &ServiceError, delay: Duration) {
            self.0.push((attempt, delay));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delays_are_observed() {
        let mut delays = Delays::default();
        let start = tokio::time::Instant::now();

        let _: Result<()> = RetryController::new()
            .execute_with(
                || async { Err(ServiceError::Timeout("slow".to_string())) },
                &fast_policy(3),
                &mut delays,
            )
            .await;

        let delays = delays.0;
        assert_eq!(delays.len(), 3);
        assert_eq!(delays.iter().map(|(a, _)| *a).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(delays[0].1 >= Duration::from_millis(100));
        assert!(delays[2].1 >= Duration::from_millis(400));

        let slept: Duration = delays.iter().map(|(_, d)| *d).sum();
        assert!(start.elapsed() >= slept);
    }

    /// Records `(event, attempt, elapsed)` as the loop reports them.
    struct Timeline {
        start: tokio::time::Instant,
        events: Vec<(&'static str, u32, Duration)>,
    }

    impl RetryObserver for Timeline {
        fn on_attempt(&mut self, attempt: u32) {
            self.events.push(("attempt", attempt, self.start.elapsed()));
        }

        fn on_retry(&mut self, attempt: u32, _error: &ServiceError, _delay: Duration) {
            self.events.push(("retry", attempt, self.start.elapsed()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_attempt_is_reported_after_backoff() {
        let mut timeline = Timeline {
            start: tokio::time::Instant::now(),
            events: Vec::new(),
        };

        let _: Result<()> = RetryController::new()
            .execute_with(
                || async { Err(ServiceError::Network("reset".to_string())) },
                &fast_policy(1),
                &mut timeline,
            )
            .await;

        let order: Vec<(&str, u32)> = timeline.events.iter().map(|(e, a, _)| (*e, *a)).collect();
        assert_eq!(order, vec![("attempt", 0), ("retry", 0), ("attempt", 1)]);

        // The retry is announced before the sleep, the next attempt after it
        assert_eq!(timeline.events[1].2, Duration::ZERO);
        assert!(timeline.events[2].2 >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_predicate_override() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let policy = fast_policy(4).with_predicate(|_| false);

        let _: Result<()> = RetryController::new()
            .execute(
                || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err(ServiceError::Network("reset".to_string())) }
                },
                &policy,
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
