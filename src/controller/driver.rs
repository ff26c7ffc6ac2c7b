use std::sync::Arc;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use super::{
    BundleApplier, NoOpReason, PassCondition, PassReport, PassResult, ReconcileError, SourceBundleReader,
    TargetResolver,
};
use crate::constants::{INJECTOR_COMPONENT, MAX_TARGET_FAILURES};
use crate::context::PassContext;
use crate::health::HealthReporter;
use crate::metrics::Metrics;
use crate::models::ReconcileRequest;
use crate::store::ResourceStore;
use crate::utils::RetryConfig;

// ============================================================================
// Reconcile Driver
// ============================================================================
//
// Runs one pass end to end and owns every health call a pass makes. Passes
// share nothing but the store and the health registry, so any number of
// them may run at once, including over the same targets.
//
// ============================================================================

pub struct ReconcileDriver {
    source: SourceBundleReader,
    resolver: TargetResolver,
    applier: BundleApplier,
    health: Arc<dyn HealthReporter>,
    metrics: Arc<Metrics>,
}

impl ReconcileDriver {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        health: Arc<dyn HealthReporter>,
        retry: RetryConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            source: SourceBundleReader::new(store.clone()),
            resolver: TargetResolver::new(store.clone()),
            applier: BundleApplier::new(store, retry, metrics.clone()),
            health,
            metrics,
        }
    }

    /// Run one reconciliation pass for `request`
    ///
    /// `Err` means the pass stopped before ApplyAll for a reason worth
    /// redelivering the notification; any degraded condition has already
    /// been reported by then.
    pub async fn reconcile(
        &self,
        ctx: &PassContext,
        request: &ReconcileRequest,
    ) -> Result<PassResult, ReconcileError> {
        let pass_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "reconcile",
            pass_id = %pass_id,
            config_map = %request.key
        );

        self.reconcile_in_span(ctx, pass_id, request)
            .instrument(span)
            .await
    }

    async fn reconcile_in_span(
        &self,
        ctx: &PassContext,
        pass_id: Uuid,
        request: &ReconcileRequest,
    ) -> Result<PassResult, ReconcileError> {
        tracing::info!("Reconciling configmap from {}", request.key);

        let started = Instant::now();
        let result = self.run_pass(ctx, pass_id, request).await;
        let elapsed = started.elapsed().as_secs_f64();

        let trigger = if request.targets_trusted_ca_bundle() {
            "bundle"
        } else {
            "target"
        };
        let label = match &result {
            Ok(pass) => pass.metric_label(),
            Err(_) => "error",
        };
        self.metrics.record_pass(trigger, label, elapsed);

        match &result {
            Ok(PassResult::Reported(report)) => tracing::info!(
                condition = ?report.condition,
                updated = report.updated(),
                unchanged = report.unchanged(),
                failed = report.failed(),
                skipped = report.skipped,
                elapsed_ms = (elapsed * 1000.0) as u64,
                "Reconciliation pass finished"
            ),
            Ok(PassResult::NoOp(reason)) => {
                tracing::debug!(reason = ?reason, "Reconciliation pass had nothing to do")
            }
            Ok(PassResult::Canceled) => tracing::warn!("Reconciliation pass canceled"),
            Err(e) => tracing::error!(error = %e, "Reconciliation pass failed"),
        }

        result
    }

    async fn run_pass(
        &self,
        ctx: &PassContext,
        pass_id: Uuid,
        request: &ReconcileRequest,
    ) -> Result<PassResult, ReconcileError> {
        // ReadSource
        let bundle = match self.source.read(ctx).await {
            Ok(Some(bundle)) => bundle,
            Ok(None) => return Ok(PassResult::NoOp(NoOpReason::BundleMissing)),
            Err(ReconcileError::Canceled) => return Ok(PassResult::Canceled),
            Err(e) => return Err(self.degrade_on(e).await),
        };

        // ResolveTargets
        let targets = match self.resolver.resolve(ctx, request).await {
            Ok(Some(targets)) => targets,
            Ok(None) => return Ok(PassResult::NoOp(NoOpReason::TargetMissing)),
            Err(ReconcileError::Canceled) => return Ok(PassResult::Canceled),
            Err(e) => return Err(self.degrade_on(e).await),
        };

        // ApplyAll
        let total = targets.len();
        let mut outcomes = Vec::with_capacity(total);
        let mut failed = 0;
        let mut skipped = 0;

        for (index, target) in targets.iter().enumerate() {
            let outcome = match self.applier.apply(ctx, target, &bundle.data).await {
                Ok(outcome) => outcome,
                Err(ReconcileError::Canceled) => return Ok(PassResult::Canceled),
                Err(e) => return Err(e),
            };

            if outcome.is_failed() {
                failed += 1;
            }
            outcomes.push((target.key(), outcome));

            if failed >= MAX_TARGET_FAILURES {
                skipped = total - index - 1;
                if skipped > 0 {
                    tracing::warn!(
                        failed = failed,
                        skipped = skipped,
                        "Failure threshold reached, abandoning remaining configmaps"
                    );
                }
                break;
            }
        }

        let condition = if failed >= MAX_TARGET_FAILURES {
            PassCondition::TooManyFailures
        } else if failed > 0 {
            PassCondition::PartialFailure
        } else {
            PassCondition::Success
        };

        // Report
        let report = PassReport {
            pass_id,
            request: request.clone(),
            condition,
            outcomes,
            skipped,
        };
        self.report(&report).await;

        Ok(PassResult::Reported(report))
    }

    async fn report(&self, report: &PassReport) {
        match report.condition {
            PassCondition::Success => {
                self.health.set_healthy(INJECTOR_COMPONENT).await;
            }
            PassCondition::TooManyFailures => {
                self.health
                    .set_degraded(
                        INJECTOR_COMPONENT,
                        report.condition.reason(),
                        "Too many errors seen when updating trusted CA configmaps",
                    )
                    .await;
            }
            PassCondition::PartialFailure => {
                self.health
                    .set_degraded(
                        INJECTOR_COMPONENT,
                        report.condition.reason(),
                        "some configmaps didn't fully update with CA cert. data",
                    )
                    .await;
            }
        }
        self.metrics
            .set_component_health(INJECTOR_COMPONENT, report.condition == PassCondition::Success);
    }

    /// Report the degraded condition `error` maps to, if any, and hand it back
    async fn degrade_on(&self, error: ReconcileError) -> ReconcileError {
        let reason = match &error {
            ReconcileError::InvalidBundle { .. } => Some("InvalidInjectorConfig"),
            ReconcileError::ListTargets(_) => Some("ListConfigMapError"),
            ReconcileError::GetTarget { .. } => Some("ClusterConfigError"),
            // The canonical read failing is retried by redelivery alone
            ReconcileError::SourceUnavailable(_) | ReconcileError::Canceled => None,
        };

        if let Some(reason) = reason {
            self.health
                .set_degraded(INJECTOR_COMPONENT, reason, &error.to_string())
                .await;
            self.metrics.set_component_health(INJECTOR_COMPONENT, false);
        }
        error
    }
}
