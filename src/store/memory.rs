use async_trait::async_trait;
use futures_util::Stream;
use std::collections::BTreeMap;
use tokio::sync::{broadcast, RwLock};

use super::{ResourceStore, StoreError};
use crate::models::{ApplyPatch, ChangeEvent, ChangeKind, ConfigMap, ObjectKey};

// ============================================================================
// In-Memory Resource Store
// ============================================================================
//
// Versioned config map store with label queries and apply semantics close to
// server-side apply:
// - every effective write bumps the object's resource version
// - an apply that changes nothing leaves the version alone and emits nothing
// - an apply carrying a stale resource version is rejected with Conflict
//
// Every effective write is published on a broadcast channel, which doubles as
// the watch stream for the demo binary.
//
// ============================================================================

const EVENT_BUFFER: usize = 1024;

struct StoreState {
    objects: BTreeMap<ObjectKey, ConfigMap>,
    last_version: u64,
}

impl StoreState {
    fn next_version(&mut self) -> u64 {
        self.last_version += 1;
        self.last_version
    }
}

pub struct InMemoryStore {
    state: RwLock<StoreState>,
    events: broadcast::Sender<ChangeEvent>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            state: RwLock::new(StoreState {
                objects: BTreeMap::new(),
                last_version: 0,
            }),
            events,
        }
    }

    /// Watch every effective write made to the store
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    /// Subscription as a stream; ends when the store is dropped
    pub fn watch(&self) -> impl Stream<Item = ChangeEvent> + Send + 'static {
        futures_util::stream::unfold(self.subscribe(), |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((event, rx)),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Watch subscriber lagged, notifications dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
    }

    /// Create or fully replace an object, as an external actor would
    pub async fn put(&self, mut cm: ConfigMap) -> ConfigMap {
        let mut state = self.state.write().await;
        let key = cm.key();
        let kind = if state.objects.contains_key(&key) {
            ChangeKind::Updated
        } else {
            ChangeKind::Created
        };

        cm.metadata.resource_version = state.next_version();
        state.objects.insert(key, cm.clone());
        drop(state);

        self.publish(kind, &cm);
        cm
    }

    pub async fn delete(&self, key: &ObjectKey) -> Result<ConfigMap, StoreError> {
        let removed = self
            .state
            .write()
            .await
            .objects
            .remove(key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;

        self.publish(ChangeKind::Deleted, &removed);
        Ok(removed)
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.objects.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn publish(&self, kind: ChangeKind, cm: &ConfigMap) {
        // No subscribers is fine
        let _ = self.events.send(ChangeEvent::new(kind, cm.clone()));
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn get(&self, key: &ObjectKey) -> Result<ConfigMap, StoreError> {
        self.state
            .read()
            .await
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    async fn list(&self, label_key: &str, label_value: &str) -> Result<Vec<ConfigMap>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .objects
            .values()
            .filter(|cm| cm.label(label_key) == Some(label_value))
            .cloned()
            .collect())
    }

    async fn apply(&self, patch: &ApplyPatch, field_manager: &str) -> Result<ConfigMap, StoreError> {
        let key = patch.key();
        let mut state = self.state.write().await;

        let (mut merged, kind) = match (state.objects.get(&key), patch.resource_version) {
            (Some(live), Some(expected)) if live.metadata.resource_version != expected => {
                return Err(StoreError::Conflict {
                    key,
                    message: format!(
                        "resource version {} does not match live version {}",
                        expected, live.metadata.resource_version
                    ),
                });
            }
            (None, Some(_)) => {
                return Err(StoreError::Conflict {
                    key,
                    message: "object no longer exists".to_string(),
                });
            }
            (Some(live), _) => (live.clone(), ChangeKind::Updated),
            (None, None) => (ConfigMap::new(&patch.namespace, &patch.name), ChangeKind::Created),
        };

        let changed = kind == ChangeKind::Created
            || patch
                .data
                .iter()
                .any(|(k, v)| merged.data.get(k) != Some(v));

        if !changed {
            return Ok(merged);
        }

        merged
            .data
            .extend(patch.data.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged.metadata.resource_version = state.next_version();
        state.objects.insert(key.clone(), merged.clone());
        drop(state);

        tracing::debug!(
            config_map = %key,
            field_manager = field_manager,
            resource_version = merged.metadata.resource_version,
            "Applied patch"
        );

        self.publish(kind, &merged);
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{FIELD_MANAGER, TRUSTED_CA_BUNDLE_CONFIGMAP_KEY, TRUSTED_CA_BUNDLE_CONFIGMAP_LABEL};
    use crate::controller::testing::labeled;

    #[tokio::test]
    async fn test_list_filters_by_label() {
        let store = InMemoryStore::new();
        store.put(labeled("a", "one")).await;
        store.put(labeled("b", "two")).await;
        store
            .put(ConfigMap::new("c", "three").with_label(TRUSTED_CA_BUNDLE_CONFIGMAP_LABEL, "false"))
            .await;
        store.put(ConfigMap::new("d", "four")).await;

        let mut names: Vec<String> = store
            .list(TRUSTED_CA_BUNDLE_CONFIGMAP_LABEL, "true")
            .await
            .unwrap()
            .into_iter()
            .map(|cm| cm.metadata.name)
            .collect();
        names.sort();

        assert_eq!(names, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_apply_merges_only_patched_keys() {
        let store = InMemoryStore::new();
        store
            .put(labeled("ns", "cm").with_data("other", "keep-me"))
            .await;

        let patch = ApplyPatch::single_key(&ObjectKey::new("ns", "cm"), TRUSTED_CA_BUNDLE_CONFIGMAP_KEY, "X");
        let merged = store.apply(&patch, FIELD_MANAGER).await.unwrap();

        assert_eq!(merged.data.get("other").map(String::as_str), Some("keep-me"));
        assert_eq!(merged.data.get(TRUSTED_CA_BUNDLE_CONFIGMAP_KEY).map(String::as_str), Some("X"));
        assert!(merged.wants_injection());
    }

    #[tokio::test]
    async fn test_stale_resource_version_conflicts() {
        let store = InMemoryStore::new();
        let original = store.put(labeled("ns", "cm")).await;
        store.put(labeled("ns", "cm").with_data("other", "v2")).await;

        let patch = ApplyPatch::single_key(&original.key(), TRUSTED_CA_BUNDLE_CONFIGMAP_KEY, "X")
            .with_resource_version(original.metadata.resource_version);
        let err = store.apply(&patch, FIELD_MANAGER).await.unwrap_err();

        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_noop_apply_keeps_version_and_emits_nothing() {
        let store = InMemoryStore::new();
        let live = store
            .put(labeled("ns", "cm").with_data(TRUSTED_CA_BUNDLE_CONFIGMAP_KEY, "X"))
            .await;
        let mut events = store.subscribe();

        let patch = ApplyPatch::single_key(&live.key(), TRUSTED_CA_BUNDLE_CONFIGMAP_KEY, "X");
        let merged = store.apply(&patch, FIELD_MANAGER).await.unwrap();

        assert_eq!(merged.metadata.resource_version, live.metadata.resource_version);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_writes_are_published() {
        let store = InMemoryStore::new();
        let mut events = store.subscribe();

        let cm = store.put(labeled("ns", "cm")).await;
        store.delete(&cm.key()).await.unwrap();

        assert_eq!(events.recv().await.unwrap().kind, ChangeKind::Created);
        assert_eq!(events.recv().await.unwrap().kind, ChangeKind::Deleted);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_watch_ends_when_store_dropped() {
        use futures_util::StreamExt;

        let store = InMemoryStore::new();
        let watch = store.watch();
        store.put(labeled("ns", "cm")).await;
        drop(store);

        let kinds: Vec<ChangeKind> = watch.map(|e| e.kind).collect().await;
        assert_eq!(kinds, vec![ChangeKind::Created]);
    }
}
