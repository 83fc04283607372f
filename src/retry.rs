//! Bounded connection retries with a linearly growing wait.
//!
//! The wait before retry `i` (0-based) is `(i + 1) * backoff`, so with the
//! defaults a collaborator sleeps 2s, 4s, 6s, 8s between five attempts.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait after failed attempt `attempt`, or `None` once the budget is spent.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt + 1 >= self.max_attempts {
            return None;
        }
        Some(self.backoff * (attempt + 1))
    }

    /// Runs `op` until it succeeds or the attempt budget is exhausted,
    /// returning the last error in the latter case.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => match self.delay_for(attempt) {
                    Some(wait) => {
                        warn!(
                            attempt = attempt + 1,
                            max_attempts = self.max_attempts,
                            wait_secs = wait.as_secs_f64(),
                            "Failed to connect to {}: {}",
                            what,
                            e
                        );
                        tokio::time::sleep(wait).await;
                        attempt += 1;
                    }
                    None => return Err(e),
                },
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(2))
    }
}
