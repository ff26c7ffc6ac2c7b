use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use crate::constants::{
    TRUSTED_CA_BUNDLE_CONFIGMAP, TRUSTED_CA_BUNDLE_CONFIGMAP_KEY, TRUSTED_CA_BUNDLE_CONFIGMAP_LABEL,
    TRUSTED_CA_BUNDLE_CONFIGMAP_NS,
};
use crate::health::HealthReporter;
use crate::models::{ApplyPatch, ConfigMap, ObjectKey};
use crate::store::{ResourceStore, StoreError};

pub(crate) fn labeled(ns: &str, name: &str) -> ConfigMap {
    ConfigMap::new(ns, name).with_label(TRUSTED_CA_BUNDLE_CONFIGMAP_LABEL, "true")
}

pub(crate) fn bundle_config_map(data: &str) -> ConfigMap {
    ConfigMap::new(TRUSTED_CA_BUNDLE_CONFIGMAP_NS, TRUSTED_CA_BUNDLE_CONFIGMAP)
        .with_data(TRUSTED_CA_BUNDLE_CONFIGMAP_KEY, data)
}

#[derive(Default)]
struct FakeState {
    objects: BTreeMap<ObjectKey, ConfigMap>,
    conflicts: HashMap<ObjectKey, u32>,
    failing_applies: HashSet<ObjectKey>,
    failing_gets: HashSet<ObjectKey>,
    fail_list: bool,
    get_calls: Vec<ObjectKey>,
    list_calls: usize,
    applies: Vec<(ApplyPatch, String)>,
}

/// Scriptable store that records every call
#[derive(Default)]
pub(crate) struct FakeStore {
    state: Mutex<FakeState>,
    /// When set, `apply` never completes
    block_applies: bool,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_objects(self, objects: Vec<ConfigMap>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            for cm in objects {
                state.objects.insert(cm.key(), cm);
            }
        }
        self
    }

    pub fn with_blocking_apply(mut self) -> Self {
        self.block_applies = true;
        self
    }

    /// Reject the next `times` applies to `key` with a conflict
    pub fn conflict_times(&self, key: &ObjectKey, times: u32) {
        self.state.lock().unwrap().conflicts.insert(key.clone(), times);
    }

    pub fn fail_apply(&self, key: &ObjectKey) {
        self.state.lock().unwrap().failing_applies.insert(key.clone());
    }

    pub fn fail_get(&self, key: &ObjectKey) {
        self.state.lock().unwrap().failing_gets.insert(key.clone());
    }

    pub fn fail_list(&self) {
        self.state.lock().unwrap().fail_list = true;
    }

    pub fn apply_calls(&self) -> usize {
        self.state.lock().unwrap().applies.len()
    }

    pub fn applied_patches(&self) -> Vec<ApplyPatch> {
        self.state.lock().unwrap().applies.iter().map(|(p, _)| p.clone()).collect()
    }

    pub fn applied_keys(&self) -> Vec<ObjectKey> {
        self.state.lock().unwrap().applies.iter().map(|(p, _)| p.key()).collect()
    }

    pub fn field_managers(&self) -> Vec<String> {
        self.state.lock().unwrap().applies.iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    pub fn get_calls(&self) -> Vec<ObjectKey> {
        self.state.lock().unwrap().get_calls.clone()
    }

    pub fn object(&self, key: &ObjectKey) -> Option<ConfigMap> {
        self.state.lock().unwrap().objects.get(key).cloned()
    }
}

#[async_trait]
impl ResourceStore for FakeStore {
    async fn get(&self, key: &ObjectKey) -> Result<ConfigMap, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.get_calls.push(key.clone());

        if state.failing_gets.contains(key) {
            return Err(StoreError::Backend("injected get failure".to_string()));
        }
        state
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    async fn list(&self, label_key: &str, label_value: &str) -> Result<Vec<ConfigMap>, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;

        if state.fail_list {
            return Err(StoreError::Backend("injected list failure".to_string()));
        }
        Ok(state
            .objects
            .values()
            .filter(|cm| cm.label(label_key) == Some(label_value))
            .cloned()
            .collect())
    }

    async fn apply(&self, patch: &ApplyPatch, field_manager: &str) -> Result<ConfigMap, StoreError> {
        if self.block_applies {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock().unwrap();
        let key = patch.key();
        state.applies.push((patch.clone(), field_manager.to_string()));

        if let Some(remaining) = state.conflicts.get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::Conflict {
                    key,
                    message: "injected conflict".to_string(),
                });
            }
        }
        if state.failing_applies.contains(&key) {
            return Err(StoreError::Backend("injected apply failure".to_string()));
        }

        let entry = state
            .objects
            .entry(key)
            .or_insert_with(|| ConfigMap::new(&patch.namespace, &patch.name));
        entry
            .data
            .extend(patch.data.iter().map(|(k, v)| (k.clone(), v.clone())));
        entry.metadata.resource_version += 1;
        Ok(entry.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum HealthCall {
    Degraded {
        component: String,
        reason: String,
        message: String,
    },
    Healthy {
        component: String,
    },
}

/// Records every health call in order
#[derive(Default)]
pub(crate) struct RecordingReporter {
    calls: Mutex<Vec<HealthCall>>,
}

impl RecordingReporter {
    pub fn calls(&self) -> Vec<HealthCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_reason(&self) -> Option<String> {
        match self.calls.lock().unwrap().last() {
            Some(HealthCall::Degraded { reason, .. }) => Some(reason.clone()),
            _ => None,
        }
    }
}

#[async_trait]
impl HealthReporter for RecordingReporter {
    async fn set_degraded(&self, component: &str, reason: &str, message: &str) {
        self.calls.lock().unwrap().push(HealthCall::Degraded {
            component: component.to_string(),
            reason: reason.to_string(),
            message: message.to_string(),
        });
    }

    async fn set_healthy(&self, component: &str) {
        self.calls.lock().unwrap().push(HealthCall::Healthy {
            component: component.to_string(),
        });
    }
}
