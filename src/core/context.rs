use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::error::{DriveError, Result};

/// Per-request execution context: a deadline and a cancellation token.
///
/// Every backend round trip goes through [`RequestContext::run`], so a
/// caller that disconnects or a request that outlives its deadline stops at
/// the next suspension point instead of draining the rest of the result set.
#[derive(Debug, Clone)]
pub struct RequestContext {
    deadline: Instant,
    cancel: CancellationToken,
}

impl RequestContext {
    pub fn new(timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            cancel,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(timeout, CancellationToken::new())
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Drive `fut` unless the request is cancelled or the deadline passes first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(DriveError::Cancelled),
            _ = tokio::time::sleep_until(self.deadline) => Err(DriveError::DeadlineExceeded),
            result = fut => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_before_deadline() {
        let ctx = RequestContext::with_timeout(Duration::from_secs(5));
        let value = ctx.run(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_aborts_pending_io() {
        let ctx = RequestContext::with_timeout(Duration::from_millis(50));
        let result: Result<()> = ctx.run(std::future::pending()).await;
        assert!(matches!(result, Err(DriveError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn cancellation_wins_over_pending_io() {
        let token = CancellationToken::new();
        let ctx = RequestContext::new(Duration::from_secs(60), token.clone());
        token.cancel();
        let result: Result<()> = ctx.run(std::future::pending()).await;
        assert!(matches!(result, Err(DriveError::Cancelled)));
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn inner_error_is_propagated() {
        let ctx = RequestContext::with_timeout(Duration::from_secs(5));
        let result: Result<()> = ctx
            .run(async { Err(DriveError::read_failure("cursor broke")) })
            .await;
        assert!(matches!(result, Err(DriveError::ReadFailure(msg)) if msg == "cursor broke"));
    }
}
