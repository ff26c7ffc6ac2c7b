use std::sync::Arc;

use super::ReconcileError;
use crate::constants::{INJECT_LABEL_VALUE, TRUSTED_CA_BUNDLE_CONFIGMAP, TRUSTED_CA_BUNDLE_CONFIGMAP_LABEL};
use crate::context::PassContext;
use crate::models::{ConfigMap, ReconcileRequest};
use crate::store::{ResourceStore, StoreError};

/// Computes the config maps a pass has to bring in line
pub struct TargetResolver {
    store: Arc<dyn ResourceStore>,
}

impl TargetResolver {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    /// `Ok(None)` when the single named target no longer exists.
    ///
    /// A request for the trusted CA bundle fans out to every labeled config map
    /// as listed right now; any other request targets exactly the named one.
    pub async fn resolve(
        &self,
        ctx: &PassContext,
        request: &ReconcileRequest,
    ) -> Result<Option<Vec<ConfigMap>>, ReconcileError> {
        if request.targets_trusted_ca_bundle() {
            let targets = ctx
                .run(self.store.list(TRUSTED_CA_BUNDLE_CONFIGMAP_LABEL, INJECT_LABEL_VALUE))
                .await
                .map_err(|e| match e {
                    StoreError::Canceled => ReconcileError::Canceled,
                    e => ReconcileError::ListTargets(e),
                })?;

            tracing::info!(
                targets = targets.len(),
                "{} changed, updating {} configMaps",
                TRUSTED_CA_BUNDLE_CONFIGMAP,
                targets.len()
            );
            return Ok(Some(targets));
        }

        match ctx.run(self.store.get(&request.key)).await {
            Ok(cm) => Ok(Some(vec![cm])),
            Err(StoreError::NotFound(_)) => {
                tracing::info!(
                    config_map = %request.key,
                    "ConfigMap not found; reconciliation will be skipped"
                );
                Ok(None)
            }
            Err(StoreError::Canceled) => Err(ReconcileError::Canceled),
            Err(source) => Err(ReconcileError::GetTarget {
                key: request.key.clone(),
                source,
            }),
        }
    }
}
