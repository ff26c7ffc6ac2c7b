use std::sync::Arc;

use super::ReconcileError;
use crate::context::PassContext;
use crate::models::ObjectKey;
use crate::store::{ResourceStore, StoreError};
use crate::validation::{trust_bundle_config_map, TrustBundle};

/// Reads and validates the canonical trusted CA bundle
pub struct SourceBundleReader {
    store: Arc<dyn ResourceStore>,
}

impl SourceBundleReader {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    /// `Ok(None)` when the bundle does not exist yet.
    pub async fn read(&self, ctx: &PassContext) -> Result<Option<TrustBundle>, ReconcileError> {
        let key = ObjectKey::trusted_ca_bundle();

        let cm = match ctx.run(self.store.get(&key)).await {
            Ok(cm) => cm,
            Err(StoreError::NotFound(_)) => {
                tracing::info!(
                    config_map = %key,
                    "ConfigMap not found; reconciliation will be skipped"
                );
                return Ok(None);
            }
            Err(StoreError::Canceled) => return Err(ReconcileError::Canceled),
            Err(e) => return Err(ReconcileError::SourceUnavailable(e)),
        };

        let bundle = trust_bundle_config_map(&cm).map_err(|source| ReconcileError::InvalidBundle {
            key: key.clone(),
            source,
        })?;

        tracing::debug!(
            config_map = %key,
            certificates = bundle.certificate_count,
            resource_version = cm.metadata.resource_version,
            "Validated trusted CA bundle"
        );

        Ok(Some(bundle))
    }
}
