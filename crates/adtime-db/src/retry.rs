//! Exponential backoff for connection establishment.
//!
//! The only operation in this crate that retries on its own is the initial
//! `PostgreSQL` connection: the store cannot work without one, and the
//! database container frequently comes up after the bot does. Every other
//! operation surfaces its failure to the caller immediately.
//!
//! Delays are deterministic (no jitter) and never decrease: each delay is
//! the previous one times `multiplier`, capped at `max_interval`. Retrying
//! stops once the next wait would push the total past `max_elapsed_time`.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// Default delay before the first retry.
const DEFAULT_INITIAL_INTERVAL_MS: u64 = 500;

/// Default growth factor between consecutive delays.
const DEFAULT_MULTIPLIER: f64 = 1.5;

/// Default cap on a single delay.
const DEFAULT_MAX_INTERVAL_SECS: u64 = 15;

/// Default total time budget for all attempts.
const DEFAULT_MAX_ELAPSED_SECS: u64 = 120;

/// Backoff parameters for a retried operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Factor applied to the delay after every failure. Values below 1.0
    /// are treated as 1.0.
    pub multiplier: f64,
    /// Upper bound for a single delay.
    pub max_interval: Duration,
    /// Total budget after which the operation is abandoned.
    pub max_elapsed_time: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(DEFAULT_INITIAL_INTERVAL_MS),
            multiplier: DEFAULT_MULTIPLIER,
            max_interval: Duration::from_secs(DEFAULT_MAX_INTERVAL_SECS),
            max_elapsed_time: Duration::from_secs(DEFAULT_MAX_ELAPSED_SECS),
        }
    }
}

impl RetryPolicy {
    /// Set the delay before the first retry.
    #[must_use]
    pub const fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    /// Set the growth factor between delays.
    #[must_use]
    pub const fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the cap on a single delay.
    #[must_use]
    pub const fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Set the total time budget.
    #[must_use]
    pub const fn with_max_elapsed_time(mut self, budget: Duration) -> Self {
        self.max_elapsed_time = budget;
        self
    }
}

/// Iterator-like source of backoff delays.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    current: Duration,
    multiplier: f64,
    max_interval: Duration,
}

impl ExponentialBackoff {
    /// Start a fresh delay sequence for `policy`.
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            current: policy.initial_interval.min(policy.max_interval),
            multiplier: policy.multiplier.max(1.0),
            max_interval: policy.max_interval,
        }
    }

    /// Return the next delay and grow the one after it.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        let grown = Duration::try_from_secs_f64(self.current.as_secs_f64() * self.multiplier)
            .unwrap_or(self.max_interval);
        self.current = grown.min(self.max_interval);
        delay
    }
}

/// The retry budget ran out; carries the last failure.
#[derive(Debug)]
pub struct RetryError<E> {
    /// Number of attempts made, including the first.
    pub attempts: u32,
    /// Time spent from the first attempt until giving up.
    pub elapsed: Duration,
    /// The error returned by the final attempt.
    pub last: E,
}

/// Run `operation` until it succeeds or the policy's budget is exhausted.
///
/// `notify` is called after every failed attempt that will be retried, with
/// the failure and the delay before the next attempt.
///
/// # Errors
///
/// Returns [`RetryError`] with the last failure once waiting for another
/// attempt would exceed [`RetryPolicy::max_elapsed_time`].
pub async fn retry_notify<T, E, F, Fut, N>(
    policy: &RetryPolicy,
    mut operation: F,
    mut notify: N,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    N: FnMut(&E, Duration),
{
    let start = Instant::now();
    let mut backoff = ExponentialBackoff::new(policy);
    let mut attempts: u32 = 0;

    loop {
        attempts = attempts.saturating_add(1);
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let delay = backoff.next_delay();
                let elapsed = start.elapsed();
                if elapsed.saturating_add(delay) > policy.max_elapsed_time {
                    return Err(RetryError {
                        attempts,
                        elapsed,
                        last: err,
                    });
                }
                notify(&err, delay);
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::default()
            .with_initial_interval(Duration::from_millis(100))
            .with_multiplier(2.0)
            .with_max_interval(Duration::from_secs(1))
            .with_max_elapsed_time(Duration::from_secs(5))
    }

    #[test]
    fn delays_grow_then_cap() {
        let mut backoff = ExponentialBackoff::new(&fast_policy());
        let delays: Vec<u128> = (0..6).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1000, 1000]);
    }

    #[test]
    fn shrinking_multiplier_is_clamped() {
        let policy = fast_policy().with_multiplier(0.5);
        let mut backoff = ExponentialBackoff::new(&policy);
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let mut calls = 0_u32;
        let mut delays = Vec::new();

        let result = retry_notify(
            &fast_policy(),
            || {
                calls += 1;
                let attempt = calls;
                async move {
                    if attempt <= 3 {
                        Err("connection refused")
                    } else {
                        Ok(attempt)
                    }
                }
            },
            |_, delay| delays.push(delay),
        )
        .await;

        assert_eq!(result.unwrap(), 4);
        assert_eq!(delays.len(), 3);
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_within_budget() {
        let policy = fast_policy();
        let start = Instant::now();
        let mut retries = 0_u32;

        let result: Result<(), _> = retry_notify(
            &policy,
            || async { Err("database is starting up") },
            |_, _| retries += 1,
        )
        .await;

        let err = result.unwrap_err();
        // 100 + 200 + 400 + 800 + 1000 + 1000 + 1000 = 4500ms of waiting;
        // one more 1000ms wait would exceed the 5s budget.
        assert_eq!(err.attempts, 8);
        assert_eq!(retries, 7);
        assert_eq!(err.last, "database is starting up");
        assert!(start.elapsed() <= policy.max_elapsed_time);
    }
}
