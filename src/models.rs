use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::constants::{
    INJECT_LABEL_VALUE, TRUSTED_CA_BUNDLE_CONFIGMAP, TRUSTED_CA_BUNDLE_CONFIGMAP_LABEL,
    TRUSTED_CA_BUNDLE_CONFIGMAP_NS,
};

// ============================================================================
// Resource Models
// ============================================================================

/// Namespaced identity of a resource
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Identity of the canonical trusted CA bundle
    pub fn trusted_ca_bundle() -> Self {
        Self::new(TRUSTED_CA_BUNDLE_CONFIGMAP_NS, TRUSTED_CA_BUNDLE_CONFIGMAP)
    }

    pub fn is_trusted_ca_bundle(&self) -> bool {
        self.namespace == TRUSTED_CA_BUNDLE_CONFIGMAP_NS && self.name == TRUSTED_CA_BUNDLE_CONFIGMAP
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ObjectMeta {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Opaque version assigned by the store on every write
    #[serde(default)]
    pub resource_version: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ConfigMap {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl ConfigMap {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta {
                namespace: namespace.into(),
                name: name.into(),
                ..Default::default()
            },
            data: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.metadata.namespace, &self.metadata.name)
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.metadata.labels.get(key).map(String::as_str)
    }

    /// Whether the config map opted into trusted CA bundle injection
    pub fn wants_injection(&self) -> bool {
        self.label(TRUSTED_CA_BUNDLE_CONFIGMAP_LABEL) == Some(INJECT_LABEL_VALUE)
    }
}

/// Sparse document for a merge-style apply
///
/// Carries only the identity and the keys the field manager owns, so fields
/// owned by other actors are left alone.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ApplyPatch {
    pub namespace: String,
    pub name: String,
    pub data: BTreeMap<String, String>,
    /// When set, the store rejects the apply if the live object moved on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<u64>,
}

impl ApplyPatch {
    pub fn single_key(key: &ObjectKey, data_key: &str, value: &str) -> Self {
        let mut data = BTreeMap::new();
        data.insert(data_key.to_string(), value.to_string());
        Self {
            namespace: key.namespace.clone(),
            name: key.name.clone(),
            data,
            resource_version: None,
        }
    }

    pub fn with_resource_version(mut self, version: u64) -> Self {
        self.resource_version = Some(version);
        self
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }
}

// ============================================================================
// Notifications
// ============================================================================

/// Kind of change observed on a config map
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
    /// Periodic resync or externally injected event
    Generic,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeKind::Created => "created",
            ChangeKind::Updated => "updated",
            ChangeKind::Deleted => "deleted",
            ChangeKind::Generic => "generic",
        };
        f.write_str(s)
    }
}

/// A change notification as delivered by the watch stream
///
/// For updates `object` is the new state.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub object: ConfigMap,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, object: ConfigMap) -> Self {
        Self { kind, object }
    }
}

/// Identifies the single resource whose state changed
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ReconcileRequest {
    pub key: ObjectKey,
}

impl ReconcileRequest {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: ObjectKey::new(namespace, name),
        }
    }

    pub fn targets_trusted_ca_bundle(&self) -> bool {
        self.key.is_trusted_ca_bundle()
    }
}

impl From<&ConfigMap> for ReconcileRequest {
    fn from(cm: &ConfigMap) -> Self {
        Self { key: cm.key() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::TRUSTED_CA_BUNDLE_CONFIGMAP_KEY;

    #[test]
    fn test_wants_injection_requires_exact_true() {
        let cm = ConfigMap::new("ns", "a").with_label(TRUSTED_CA_BUNDLE_CONFIGMAP_LABEL, "true");
        assert!(cm.wants_injection());

        let cm = ConfigMap::new("ns", "a").with_label(TRUSTED_CA_BUNDLE_CONFIGMAP_LABEL, "True");
        assert!(!cm.wants_injection());

        assert!(!ConfigMap::new("ns", "a").wants_injection());
    }

    #[test]
    fn test_apply_patch_is_sparse() {
        let patch = ApplyPatch::single_key(&ObjectKey::new("ns", "a"), TRUSTED_CA_BUNDLE_CONFIGMAP_KEY, "X");
        let json = serde_json::to_value(&patch).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "namespace": "ns",
                "name": "a",
                "data": { "ca-bundle.crt": "X" }
            })
        );
    }

    #[test]
    fn test_trusted_ca_bundle_identity() {
        assert!(ObjectKey::trusted_ca_bundle().is_trusted_ca_bundle());
        assert!(!ObjectKey::new("default", TRUSTED_CA_BUNDLE_CONFIGMAP).is_trusted_ca_bundle());
        assert_eq!(
            ObjectKey::trusted_ca_bundle().to_string(),
            "openshift-config-managed/trusted-ca-bundle"
        );
    }
}
