use futures_util::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use super::{filter, PassCondition, PassResult, ReconcileDriver, ReconcileError};
use crate::constants::CONTROLLER_NAME;
use crate::context::PassContext;
use crate::metrics::Metrics;
use crate::models::{ChangeEvent, ReconcileRequest};

// ============================================================================
// Dispatcher
// ============================================================================
//
// Drains a notification stream, drops what the filter rejects, and runs one
// pass per accepted notification on a bounded pool of workers. Each pass
// gets a child of the dispatcher's shutdown token plus the configured
// deadline. Duplicates and reordering are harmless: every pass re-reads the
// store and writes idempotently.
//
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub received: usize,
    pub dropped: usize,
    pub passes: usize,
    /// Passes that degraded or errored
    pub failed_passes: usize,
    pub canceled_passes: usize,
}

impl DispatchSummary {
    fn record(&mut self, joined: Result<Result<PassResult, ReconcileError>, JoinError>) {
        match joined {
            Ok(Ok(PassResult::Canceled)) => self.canceled_passes += 1,
            Ok(Ok(PassResult::Reported(report))) => {
                self.passes += 1;
                if report.condition != PassCondition::Success {
                    self.failed_passes += 1;
                }
            }
            Ok(Ok(PassResult::NoOp(_))) => self.passes += 1,
            Ok(Err(_)) => {
                self.passes += 1;
                self.failed_passes += 1;
            }
            Err(e) => {
                tracing::error!(error = %e, "Reconciliation task panicked");
                self.passes += 1;
                self.failed_passes += 1;
            }
        }
    }
}

pub struct Dispatcher {
    driver: Arc<ReconcileDriver>,
    workers: Arc<Semaphore>,
    pass_timeout: Option<Duration>,
    shutdown: CancellationToken,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    pub fn new(driver: Arc<ReconcileDriver>, workers: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            driver,
            workers: Arc::new(Semaphore::new(workers.max(1))),
            pass_timeout: None,
            shutdown: CancellationToken::new(),
            metrics,
        }
    }

    pub fn with_pass_timeout(mut self, timeout: Duration) -> Self {
        self.pass_timeout = Some(timeout);
        self
    }

    /// Canceling this token stops intake and cancels in-flight passes
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until the stream ends or shutdown is requested, then drain
    pub async fn run<S>(self, events: S) -> DispatchSummary
    where
        S: Stream<Item = ChangeEvent>,
    {
        tokio::pin!(events);

        tracing::info!(
            controller = CONTROLLER_NAME,
            workers = self.workers.available_permits(),
            "🔄 Starting dispatcher"
        );

        let mut summary = DispatchSummary::default();
        let mut tasks = JoinSet::new();

        loop {
            let event = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                event = events.next() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            summary.received += 1;
            let accepted = filter::accepts(&event);
            self.metrics.record_event(&event.kind.to_string(), accepted);

            if !accepted {
                summary.dropped += 1;
                tracing::trace!(
                    config_map = %event.object.key(),
                    kind = %event.kind,
                    "Ignoring change notification"
                );
                continue;
            }

            let permit = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                permit = self.workers.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let request = ReconcileRequest::from(&event.object);
            let driver = self.driver.clone();
            let mut ctx = PassContext::new(self.shutdown.child_token());
            if let Some(timeout) = self.pass_timeout {
                ctx = ctx.with_timeout(timeout);
            }

            tasks.spawn(async move {
                let _permit = permit;
                driver.reconcile(&ctx, &request).await
            });

            while let Some(joined) = tasks.try_join_next() {
                summary.record(joined);
            }
        }

        tracing::info!(in_flight = tasks.len(), "Dispatcher stopping, draining passes");
        while let Some(joined) = tasks.join_next().await {
            summary.record(joined);
        }

        tracing::info!(
            received = summary.received,
            dropped = summary.dropped,
            passes = summary.passes,
            failed = summary.failed_passes,
            canceled = summary.canceled_passes,
            "🛑 Dispatcher stopped"
        );
        summary
    }
}
