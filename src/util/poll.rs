//! Bounded fixed-interval polling.

use std::future::Future;
use std::time::Duration;

use crate::error::ChatError;

/// Polling policy configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// Maximum number of status queries before giving up.
    pub max_attempts: u32,
    /// Delay before every status query.
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            interval: Duration::from_secs(1),
        }
    }
}

/// Result of a single status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus<T> {
    /// Not finished yet; ask again after the interval.
    Pending,
    Ready(T),
}

impl PollPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Query `operation` until it reports [`PollStatus::Ready`].
    ///
    /// Transient errors count as a spent attempt and polling continues.
    /// Any other error ends polling immediately. When every attempt is spent
    /// the result is [`ChatError::Timeout`].
    pub async fn poll_until<F, Fut, T>(&self, mut operation: F) -> Result<T, ChatError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<PollStatus<T>, ChatError>>,
    {
        for attempt in 1..=self.max_attempts {
            tokio::time::sleep(self.interval).await;

            match operation(attempt).await {
                Ok(PollStatus::Ready(value)) => return Ok(value),
                Ok(PollStatus::Pending) => {
                    tracing::trace!(attempt, max_attempts = self.max_attempts, "Run still pending");
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Poll attempt failed"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(ChatError::Timeout {
            attempts: self.max_attempts,
        })
    }
}
