//! Bounded retry with a fixed pause between attempts.
//!
//! One primitive serves every retrying call site: generation requests, health
//! probes, and checkout directory removal. The pause is a real blocking sleep
//! and is never taken after the final attempt.

use std::fmt::Display;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

/// Attempt budget and pause used by [`retry_with_backoff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Zero is treated as one.
    pub max_attempts: u32,
    /// Pause between consecutive attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Same budget, no pauses (tests and already-rate-limited callers).
    pub const fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

/// Run `op` until it succeeds, returns a non-retryable error, or the budget is spent.
///
/// `op` receives the 1-indexed attempt number. The last error is returned
/// unchanged so callers can still classify it.
pub fn retry_with_backoff<T, E, F, P>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
    retryable: P,
) -> Result<T, E>
where
    E: Display,
    F: FnMut(u32) -> Result<T, E>,
    P: Fn(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Ok(value) => {
                debug!(label, attempt, "attempt succeeded");
                return Ok(value);
            }
            Err(err) => {
                if attempt >= max_attempts || !retryable(&err) {
                    warn!(label, attempt, err = %err, "giving up");
                    return Err(err);
                }
                warn!(label, attempt, max_attempts, err = %err, "attempt failed, retrying");
                if !policy.delay.is_zero() {
                    thread::sleep(policy.delay);
                }
                attempt += 1;
            }
        }
    }
}

/// Retry predicate that treats every error as transient.
pub fn always<E>(_err: &E) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn stops_at_first_success() {
        let mut calls = 0;
        let result: Result<&str, String> = retry_with_backoff(
            &RetryPolicy::immediate(3),
            "test",
            |attempt| {
                calls += 1;
                if attempt < 2 {
                    Err(format!("fail {attempt}"))
                } else {
                    Ok("done")
                }
            },
            always,
        );
        assert_eq!(result, Ok("done"));
        assert_eq!(calls, 2);
    }

    #[test]
    fn returns_last_error_when_budget_spent() {
        let mut seen = Vec::new();
        let result: Result<(), String> = retry_with_backoff(
            &RetryPolicy::immediate(3),
            "test",
            |attempt| {
                seen.push(attempt);
                Err(format!("fail {attempt}"))
            },
            always,
        );
        assert_eq!(result, Err("fail 3".to_string()));
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn non_retryable_error_stops_immediately() {
        let mut calls = 0;
        let result: Result<(), String> = retry_with_backoff(
            &RetryPolicy::immediate(5),
            "test",
            |_| {
                calls += 1;
                Err("fatal".to_string())
            },
            |err: &String| err != "fatal",
        );
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn zero_budget_still_attempts_once() {
        let mut calls = 0;
        let _: Result<(), String> = retry_with_backoff(
            &RetryPolicy::immediate(0),
            "test",
            |_| {
                calls += 1;
                Err("nope".to_string())
            },
            always,
        );
        assert_eq!(calls, 1);
    }

    #[test]
    fn pauses_between_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_millis(20));
        let start = Instant::now();
        let _: Result<(), String> =
            retry_with_backoff(&policy, "test", |_| Err("nope".to_string()), always);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(40), "elapsed {elapsed:?}");
    }
}
