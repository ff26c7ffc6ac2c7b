// ============================================================================
// Resource Store
// ============================================================================
//
// The controller talks to the cluster's resource store only through this
// trait: point reads, label queries and merge-style applies. Conflict
// detection is the store's job; the controller never locks.
//
// ============================================================================

mod memory;

use async_trait::async_trait;

use crate::models::{ApplyPatch, ConfigMap, ObjectKey};
use crate::utils::IsTransient;

pub use memory::InMemoryStore;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("config map {0} not found")]
    NotFound(ObjectKey),

    #[error("conflict writing {key}: {message}")]
    Conflict { key: ObjectKey, message: String },

    #[error("store call canceled")]
    Canceled,

    #[error("store error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

impl IsTransient for StoreError {
    /// Only optimistic-concurrency conflicts are worth retrying in place.
    fn is_transient(&self) -> bool {
        self.is_conflict()
    }
}

#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get(&self, key: &ObjectKey) -> Result<ConfigMap, StoreError>;

    /// All config maps whose `label_key` equals `label_value`, in no particular order
    async fn list(&self, label_key: &str, label_value: &str) -> Result<Vec<ConfigMap>, StoreError>;

    /// Merge `patch` into the live object on behalf of `field_manager`
    async fn apply(&self, patch: &ApplyPatch, field_manager: &str) -> Result<ConfigMap, StoreError>;
}
