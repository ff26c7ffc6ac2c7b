use std::sync::Arc;

use super::{ReconcileError, SyncOutcome};
use crate::constants::{FIELD_MANAGER, TRUSTED_CA_BUNDLE_CONFIGMAP_KEY};
use crate::context::PassContext;
use crate::metrics::Metrics;
use crate::models::{ApplyPatch, ConfigMap};
use crate::store::{ResourceStore, StoreError};
use crate::utils::{retry_on_transient, RetryConfig, RetryResult};

const APPLY_OPERATION: &str = "configmap_apply";

// ============================================================================
// Bundle Applier
// ============================================================================
//
// Brings one target in line with the bundle:
// 1. skip the write when the designated key already holds the bundle
// 2. otherwise apply a sparse patch carrying only identity + that key,
//    conditioned on the resource version the decision was based on
// 3. on conflict, re-read the target and go again under the retry policy;
//    anything else fails the target immediately
//
// ============================================================================

enum ApplyStep {
    Written,
    /// A concurrent writer already brought the target in line
    AlreadyCurrent,
    /// The target was deleted underneath us
    Vanished,
}

pub struct BundleApplier {
    store: Arc<dyn ResourceStore>,
    retry: RetryConfig,
    metrics: Arc<Metrics>,
}

impl BundleApplier {
    pub fn new(store: Arc<dyn ResourceStore>, retry: RetryConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            retry,
            metrics,
        }
    }

    /// Only cancellation is reported as `Err`; every other failure is a
    /// [`SyncOutcome::Failed`] for the caller to aggregate.
    pub async fn apply(
        &self,
        ctx: &PassContext,
        target: &ConfigMap,
        bundle: &str,
    ) -> Result<SyncOutcome, ReconcileError> {
        let key = target.key();

        if holds_bundle(target, bundle) {
            tracing::debug!(config_map = %key, "ConfigMap already holds the trusted CA bundle");
            return Ok(SyncOutcome::Unchanged);
        }

        let store = &self.store;
        let metrics = &self.metrics;
        let mut attempts = 0;

        let result = retry_on_transient(&self.retry, ctx.cancelled(), |attempt| {
            attempts = attempt;
            let key = key.clone();

            async move {
                let resource_version = if attempt == 1 {
                    target.metadata.resource_version
                } else {
                    metrics.record_retry_attempt(APPLY_OPERATION, attempt);

                    let live = match ctx.run(store.get(&key)).await {
                        Ok(live) => live,
                        Err(StoreError::NotFound(_)) => return Ok(ApplyStep::Vanished),
                        Err(e) => return Err(e),
                    };
                    if holds_bundle(&live, bundle) {
                        return Ok(ApplyStep::AlreadyCurrent);
                    }
                    live.metadata.resource_version
                };

                // Sparse object with only the key we own, so the merge leaves
                // every other field alone.
                let patch = ApplyPatch::single_key(&key, TRUSTED_CA_BUNDLE_CONFIGMAP_KEY, bundle)
                    .with_resource_version(resource_version);

                ctx.run(store.apply(&patch, FIELD_MANAGER))
                    .await
                    .map(|_| ApplyStep::Written)
            }
        })
        .await;

        if attempts > 1 {
            self.metrics
                .record_retry_outcome(APPLY_OPERATION, matches!(result, RetryResult::Success(_)));
        }

        let outcome = match result {
            RetryResult::Success(ApplyStep::Written) => {
                tracing::info!(
                    config_map = %key,
                    attempts = attempts,
                    "Updated ConfigMap with trusted CA bundle"
                );
                SyncOutcome::Updated { attempts }
            }
            RetryResult::Success(ApplyStep::AlreadyCurrent) => {
                tracing::debug!(config_map = %key, "ConfigMap brought up to date concurrently");
                SyncOutcome::Unchanged
            }
            RetryResult::Success(ApplyStep::Vanished) => {
                tracing::debug!(config_map = %key, "ConfigMap disappeared during update");
                SyncOutcome::Unchanged
            }
            RetryResult::Canceled | RetryResult::PermanentFailure(StoreError::Canceled) => {
                return Err(ReconcileError::Canceled);
            }
            RetryResult::Failed(e) | RetryResult::PermanentFailure(e) => {
                tracing::error!(
                    config_map = %key,
                    attempts = attempts,
                    error = %e,
                    "Failed to update ConfigMap with trusted CA bundle"
                );
                SyncOutcome::Failed(e)
            }
        };

        self.metrics.record_target_outcome(outcome.label());
        Ok(outcome)
    }
}

fn holds_bundle(cm: &ConfigMap, bundle: &str) -> bool {
    cm.data
        .get(TRUSTED_CA_BUNDLE_CONFIGMAP_KEY)
        .is_some_and(|existing| existing == bundle)
}
