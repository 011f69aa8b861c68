//! Process-wide store of published engine snapshots.
//!
//! Enforcement call sites acquire the snapshot for an instance name
//! without holding any reference to the coordinator. Reload replaces an
//! entry atomically; shutdown erases it so dead instances do not leak.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::engine::EngineSnapshot;

static SNAPSHOTS: Lazy<RwLock<HashMap<String, Arc<EngineSnapshot>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Publish (or replace) the snapshot for `name`.
pub fn publish(name: &str, snapshot: Arc<EngineSnapshot>) {
    SNAPSHOTS.write().insert(name.to_string(), snapshot);
}

/// Current snapshot for `name`, if the instance is running.
pub fn snapshot(name: &str) -> Option<Arc<EngineSnapshot>> {
    SNAPSHOTS.read().get(name).cloned()
}

/// Erase the entry for `name`. Safe to call twice.
pub fn remove(name: &str) {
    SNAPSHOTS.write().remove(name);
}

#[cfg(test)]
pub(crate) fn contains(name: &str) -> bool {
    SNAPSHOTS.read().contains_key(name)
}
