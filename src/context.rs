use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::store::StoreError;

/// Cancellation scope for a single reconciliation pass
///
/// Every store call made on behalf of a pass goes through [`PassContext::run`],
/// which aborts the call with [`StoreError::Canceled`] once the token fires or
/// the deadline passes.
#[derive(Clone, Debug)]
pub struct PassContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl PassContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// A context that is never canceled
    pub fn background() -> Self {
        Self::new(CancellationToken::new())
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once the pass is canceled or its deadline passes
    pub async fn cancelled(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = sleep_until(deadline) => {}
                }
            }
            None => self.cancel.cancelled().await,
        }
    }

    /// Race a store call against cancellation
    pub async fn run<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        if self.is_cancelled() {
            return Err(StoreError::Canceled);
        }

        tokio::select! {
            biased;
            _ = self.cancelled() => Err(StoreError::Canceled),
            result = call => result,
        }
    }
}
