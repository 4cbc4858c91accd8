use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a [`RunContext`] stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Cancellation {
    #[error("context deadline exceeded")]
    DeadlineExceeded,
    #[error("context cancelled")]
    Cancelled,
}

/// Cancellation signal with an optional deadline, shared by every task of one request.
///
/// Children observe their parent's cancellation and never outlive its deadline.
#[derive(Clone, Debug, Default)]
pub struct RunContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        Self {
            token: self.token.child_token(),
            deadline: Some(match self.deadline {
                Some(parent) => parent.min(deadline),
                None => deadline,
            }),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn err(&self) -> Option<Cancellation> {
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            Some(Cancellation::DeadlineExceeded)
        } else if self.token.is_cancelled() {
            Some(Cancellation::Cancelled)
        } else {
            None
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> Cancellation {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {
                        self.err().unwrap_or(Cancellation::Cancelled)
                    }
                    _ = tokio::time::sleep_until(deadline) => Cancellation::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                Cancellation::Cancelled
            }
        }
    }
}
