//! Process-wide store handle for callers that cannot have the store injected.

use std::sync::RwLock;

use once_cell::sync::Lazy;

use crate::store::ApprovalStore;

static GLOBAL_STORE: Lazy<RwLock<Option<ApprovalStore>>> = Lazy::new(|| RwLock::new(None));

/// Installs `store` as the process-wide handle, replacing any previous one.
pub fn set_global_store(store: ApprovalStore) {
    *GLOBAL_STORE.write().unwrap_or_else(|e| e.into_inner()) = Some(store);
}

/// Removes the process-wide handle.
pub fn clear_global_store() {
    *GLOBAL_STORE.write().unwrap_or_else(|e| e.into_inner()) = None;
}

pub fn global_store() -> Option<ApprovalStore> {
    GLOBAL_STORE
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
}
