//! Retry logic with exponential backoff.
//!
//! Every polling loop in the crate goes through [`with_retry`] so that the
//! schedule is always an explicit [`Backoff`] value and exhaustion always
//! surfaces as an [`Exhausted`] error.

use crate::types::{Backoff, Bound};
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

/// Callback trait for retry progress notifications.
pub trait RetryCallback {
    /// Called when an operation is about to be retried.
    ///
    /// # Arguments
    /// * `attempt` - Attempt that just failed (1-indexed)
    /// * `error` - The error that triggered the retry
    /// * `delay` - Time until the next attempt
    fn on_retry(&self, attempt: u32, error: &dyn fmt::Display, delay: Duration);
}

/// No-op callback that does nothing.
pub struct NoCallback;

impl RetryCallback for NoCallback {
    fn on_retry(&self, _attempt: u32, _error: &dyn fmt::Display, _delay: Duration) {}
}

/// Callback that reports retries at debug level.
pub struct LogCallback<'a>(pub &'a str);

impl RetryCallback for LogCallback<'_> {
    fn on_retry(&self, attempt: u32, error: &dyn fmt::Display, delay: Duration) {
        log::debug!(
            "{}: attempt {} failed: {}; retrying in {:?}",
            self.0,
            attempt,
            error,
            delay
        );
    }
}

/// The retry loop gave up; carries the last error seen.
#[derive(Debug)]
pub struct Exhausted<E> {
    /// Number of attempts made
    pub attempts: u32,
    /// Error returned by the final attempt
    pub last: E,
}

impl<E: fmt::Display> fmt::Display for Exhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gave up after {} attempts: {}", self.attempts, self.last)
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for Exhausted<E> {}

/// Execute an operation with retry logic.
///
/// Every error is retried until the policy's bound is reached. A deadline
/// bound never sleeps past the deadline.
///
/// # Arguments
/// * `policy` - Backoff schedule and bound
/// * `callback` - Optional callback for retry notifications
/// * `operation` - The operation to execute
pub fn with_retry<T, E, F>(
    policy: &Backoff,
    callback: Option<&dyn RetryCallback>,
    mut operation: F,
) -> std::result::Result<T, Exhausted<E>>
where
    E: fmt::Display,
    F: FnMut() -> std::result::Result<T, E>,
{
    let started = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        let error = match operation() {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        attempt += 1;

        let mut delay = policy.delay_for_attempt(attempt - 1);
        match policy.bound {
            Bound::Attempts(max) => {
                if attempt >= max {
                    return Err(Exhausted {
                        attempts: attempt,
                        last: error,
                    });
                }
            }
            Bound::Deadline(deadline) => {
                let remaining = deadline.saturating_sub(started.elapsed());
                if remaining.is_zero() {
                    return Err(Exhausted {
                        attempts: attempt,
                        last: error,
                    });
                }
                delay = delay.min(remaining);
            }
        }

        if let Some(cb) = callback {
            cb.on_retry(attempt, &error, delay);
        }
        thread::sleep(delay);
    }
}
