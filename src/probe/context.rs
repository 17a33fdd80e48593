use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::error::ProbeError;

/// Execution context handed to a probe by its driver.
///
/// Cancelling the token aborts the probe at its next suspension point. The
/// optional deadline is combined with the probe's own timeout, whichever is earlier.
#[derive(Debug, Clone, Default)]
pub struct ProbeContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl ProbeContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Bound one probe attempt by `timeout` and by this context.
    pub fn bound(&self, timeout: Duration) -> Bound<'_> {
        let own = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(deadline) if deadline < own => deadline,
            _ => own,
        };
        Bound {
            cancel: &self.cancel,
            deadline,
            budget: deadline.saturating_duration_since(Instant::now()),
        }
    }
}

/// Deadline and cancellation applied to every suspending step of one attempt.
pub struct Bound<'a> {
    cancel: &'a CancellationToken,
    deadline: Instant,
    budget: Duration,
}

impl Bound<'_> {
    /// Drive `fut` until it completes, the deadline passes or the context is cancelled.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, ProbeError>
    where
        F: Future<Output = Result<T, ProbeError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ProbeError::Cancelled),
            res = tokio::time::timeout_at(self.deadline, fut) => match res {
                Ok(res) => res,
                Err(_) => Err(ProbeError::Timeout(self.budget)),
            },
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let ctx = ProbeContext::default();
        let bound = ctx.bound(Duration::from_millis(20));
        let res: Result<(), _> = bound
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(res, Err(ProbeError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_context_deadline_wins_when_earlier() {
        let deadline = Instant::now() + Duration::from_millis(10);
        let ctx = ProbeContext::default().with_deadline(deadline);
        let bound = ctx.bound(Duration::from_secs(30));
        assert_eq!(bound.deadline(), deadline);

        let later = Instant::now() + Duration::from_secs(60);
        let ctx = ProbeContext::default().with_deadline(later);
        assert!(ctx.bound(Duration::from_secs(1)).deadline() < later);
    }

    #[tokio::test]
    async fn test_cancellation_aborts_promptly() {
        let token = CancellationToken::new();
        let ctx = ProbeContext::new(token.child_token());
        token.cancel();

        let res: Result<(), _> = ctx
            .bound(Duration::from_secs(30))
            .run(std::future::pending())
            .await;
        assert!(matches!(res, Err(ProbeError::Cancelled)));
        assert!(ctx.is_cancelled());
    }
}
