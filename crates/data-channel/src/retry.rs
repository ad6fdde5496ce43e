//! Bounded retry for transient socket back-pressure.

use std::io;
use std::time::Duration;

use tracing::trace;

use crate::DataChannelError;

/// How long to keep retrying a read or write the socket refused with
/// "would block".
///
/// The counter covers consecutive refusals; any byte moved resets it.
/// A zero backoff yields to the scheduler between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1000,
            backoff: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub(crate) fn tracker(&self, context: &'static str) -> RetryTracker {
        RetryTracker {
            policy: *self,
            context,
            attempts: 0,
        }
    }
}

/// Returns true for errors that mean "try again", not "broken".
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Per-operation retry state.
pub(crate) struct RetryTracker {
    policy: RetryPolicy,
    context: &'static str,
    attempts: u32,
}

impl RetryTracker {
    /// Waits before the next attempt, or fails once the budget is spent.
    pub(crate) async fn wait(&mut self, err: io::Error) -> Result<(), DataChannelError> {
        if self.attempts >= self.policy.max_attempts {
            return Err(DataChannelError::transfer(
                format!(
                    "{} (socket still busy after {} retries)",
                    self.context, self.attempts
                ),
                err,
            ));
        }
        self.attempts += 1;
        trace!(context = self.context, attempt = self.attempts, "socket busy, retrying");

        if self.policy.backoff.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.policy.backoff).await;
        }
        Ok(())
    }

    pub(crate) fn reset(&mut self) {
        self.attempts = 0;
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds() {
        assert!(is_transient(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(is_transient(&io::Error::from(io::ErrorKind::Interrupted)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::BrokenPipe)));
    }

    #[tokio::test]
    async fn tracker_exhausts_budget() {
        let policy = RetryPolicy {
            max_attempts: 2,
            backoff: Duration::ZERO,
        };
        let mut tracker = policy.tracker("sending data");
        let busy = || io::Error::from(io::ErrorKind::WouldBlock);
        assert!(tracker.wait(busy()).await.is_ok());
        assert!(tracker.wait(busy()).await.is_ok());
        let err = tracker.wait(busy()).await.unwrap_err();
        assert!(err.to_string().contains("still busy after 2 retries"));
    }

    #[tokio::test]
    async fn reset_restores_budget() {
        let policy = RetryPolicy {
            max_attempts: 1,
            backoff: Duration::ZERO,
        };
        let mut tracker = policy.tracker("receiving data");
        tracker
            .wait(io::Error::from(io::ErrorKind::WouldBlock))
            .await
            .unwrap();
        tracker.reset();
        assert_eq!(tracker.attempts(), 0);
        assert!(
            tracker
                .wait(io::Error::from(io::ErrorKind::WouldBlock))
                .await
                .is_ok()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_sleeps() {
        let policy = RetryPolicy {
            max_attempts: 1,
            backoff: Duration::from_millis(250),
        };
        let mut tracker = policy.tracker("sending data");
        let start = tokio::time::Instant::now();
        tracker
            .wait(io::Error::from(io::ErrorKind::WouldBlock))
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(250));
    }
}
