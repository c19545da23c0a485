// SPDX-License-Identifier: MIT
//! Exponential backoff for remote calls.
//!
//! Only errors the caller classifies as transient are retried; auth and
//! precondition failures surface immediately.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Backoff policy for transient remote failures.
#[derive(Debug, Clone)]
pub struct Backoff {
    /// Maximum number of attempts, including the first try.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure.
    pub initial_delay: Duration,
    /// Cap on the delay between attempts.
    pub max_delay: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl Backoff {
    /// Millisecond delays, for unit tests that exercise the retry loop.
    pub fn instant() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
        }
    }

    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or
    /// exhausts `max_attempts`. `retryable` decides which errors are worth
    /// another attempt.
    pub async fn run<F, Fut, T, E>(&self, mut op: F, retryable: impl Fn(&E) -> bool) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        assert!(self.max_attempts > 0, "Backoff.max_attempts must be at least 1");

        let mut delay = self.initial_delay;
        for attempt in 1..=self.max_attempts {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "retry succeeded");
                    }
                    return Ok(value);
                }
                Err(e) if attempt < self.max_attempts && retryable(&e) => {
                    warn!(
                        attempt,
                        max = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        err = %e,
                        "transient failure — backing off"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.max_delay);
                }
                Err(e) => return Err(e),
            }
        }
        unreachable!("final attempt returns from the loop")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn first_attempt_success_does_not_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result: Result<u32, String> = Backoff::instant()
            .run(
                || {
                    let c = c.clone();
                    async move {
                        c.fetch_add(1, Ordering::Relaxed);
                        Ok(7)
                    }
                },
                |_| true,
            )
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result: Result<u32, String> = Backoff::instant()
            .run(
                || {
                    let c = c.clone();
                    async move {
                        let n = c.fetch_add(1, Ordering::Relaxed) + 1;
                        if n < 3 {
                            Err(format!("attempt {n} failed"))
                        } else {
                            Ok(n)
                        }
                    }
                },
                |_| true,
            )
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn permanent_errors_fail_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result: Result<u32, String> = Backoff::instant()
            .run(
                || {
                    let c = c.clone();
                    async move {
                        c.fetch_add(1, Ordering::Relaxed);
                        Err("forbidden".to_string())
                    }
                },
                |e: &String| e.starts_with("timeout"),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result: Result<u32, String> = Backoff::instant()
            .run(
                || {
                    let c = c.clone();
                    async move {
                        c.fetch_add(1, Ordering::Relaxed);
                        Err("timeout".to_string())
                    }
                },
                |_| true,
            )
            .await;

        assert_eq!(result.unwrap_err(), "timeout");
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }
}
