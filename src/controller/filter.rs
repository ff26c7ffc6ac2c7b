use crate::models::{ChangeEvent, ChangeKind, ConfigMap};

/// Whether a change to `cm` can require config maps to be updated
///
/// True for the trusted CA bundle itself and for any config map that opted
/// into injection.
pub fn should_update_config_maps(cm: &ConfigMap) -> bool {
    cm.wants_injection() || cm.key().is_trusted_ca_bundle()
}

/// Admission predicate for the watch stream
///
/// Deletions are never reconciled; the store's garbage collection owns them.
pub fn accepts(event: &ChangeEvent) -> bool {
    match event.kind {
        ChangeKind::Deleted => false,
        ChangeKind::Created | ChangeKind::Updated | ChangeKind::Generic => {
            should_update_config_maps(&event.object)
        }
    }
}
