//! Fixed-delay retry for transport-level failures
//!
//! Only the operation's own `Err` is retried. Callers decide what counts as
//! transport failure by what they return as `Err`; an HTTP response with a
//! bad status is a value, not a retry.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    delay: Duration,
}

/// Every attempt failed; `last` is the final error
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub last: E,
}

impl RetryPolicy {
    /// `attempts` is clamped to at least one
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts: attempts.max(1), delay }
    }

    #[inline]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[inline]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `operation` until it succeeds or the attempts are used up.
    ///
    /// The closure receives the 1-based attempt number. The delay is slept
    /// between attempts, never after the last one.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, Exhausted<E>>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.attempts => {
                    return Err(Exhausted { attempts: attempt, last: e });
                }
                Err(e) => {
                    warn!(
                        operation = %label,
                        attempt = %attempt,
                        max_attempts = %self.attempts,
                        error = %e,
                        "request_retry"
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
