//! In-memory policy rule storage.
//!
//! Rules are grouped by policy type (`"p"`, `"p2"`, …) and held in an
//! immutable snapshot behind an `ArcSwap`, the same read/write discipline
//! as the role-manager store: readers load a snapshot and iterate it
//! without locks, writers serialize and republish.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

type Rules = BTreeMap<String, Vec<Vec<String>>>;

pub struct PolicyStore {
    rules: ArcSwap<Rules>,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for PolicyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyStore")
            .field("rules", &self.rules.load())
            .finish()
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyStore {
    pub fn new() -> Self {
        Self {
            rules: ArcSwap::from_pointee(Rules::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Current snapshot, for lock-free iteration on the enforcement path.
    pub(crate) fn snapshot(&self) -> Arc<Rules> {
        self.rules.load_full()
    }

    /// Rules stored under `ptype`, copied out for inspection.
    pub fn rules(&self, ptype: &str) -> Vec<Vec<String>> {
        self.rules.load().get(ptype).cloned().unwrap_or_default()
    }

    pub fn contains(&self, ptype: &str, rule: &[String]) -> bool {
        self.rules
            .load()
            .get(ptype)
            .is_some_and(|rows| rows.iter().any(|r| r == rule))
    }

    /// Insert a rule. Returns `false` when it is already stored.
    pub fn add(&self, ptype: &str, rule: Vec<String>) -> bool {
        let _guard = self.write_lock.lock();
        if self.contains(ptype, &rule) {
            return false;
        }
        let mut next = (**self.rules.load()).clone();
        next.entry(ptype.to_string()).or_default().push(rule);
        self.rules.store(Arc::new(next));
        true
    }

    /// Remove an exact rule. Returns `false` when it was absent.
    pub fn remove(&self, ptype: &str, rule: &[String]) -> bool {
        let _guard = self.write_lock.lock();
        if !self.contains(ptype, rule) {
            return false;
        }
        let mut next = (**self.rules.load()).clone();
        if let Some(rows) = next.get_mut(ptype) {
            rows.retain(|r| r != rule);
            if rows.is_empty() {
                next.remove(ptype);
            }
        }
        self.rules.store(Arc::new(next));
        true
    }

    /// Remove every rule whose values starting at `field_index` match
    /// `field_values`; an empty string matches anything. Returns whether
    /// any rule was removed.
    pub fn remove_filtered(&self, ptype: &str, field_index: usize, field_values: &[String]) -> bool {
        let matches = |rule: &Vec<String>| {
            field_values.iter().enumerate().all(|(i, want)| {
                want.is_empty()
                    || rule
                        .get(field_index + i)
                        .is_some_and(|have| have == want)
            })
        };

        let _guard = self.write_lock.lock();
        let current = self.rules.load();
        let Some(rows) = current.get(ptype) else {
            return false;
        };
        if !rows.iter().any(&matches) {
            return false;
        }

        let mut next = (**current).clone();
        if let Some(rows) = next.get_mut(ptype) {
            rows.retain(|r| !matches(r));
            if rows.is_empty() {
                next.remove(ptype);
            }
        }
        self.rules.store(Arc::new(next));
        true
    }

    pub fn clear(&self) {
        let _guard = self.write_lock.lock();
        self.rules.store(Arc::new(Rules::new()));
    }

    pub fn len(&self) -> usize {
        self.rules.load().values().map(|rows| rows.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_add_and_contains() {
        let store = PolicyStore::new();
        assert!(store.add("p", rule(&["alice", "/data", "read"])));
        assert!(store.contains("p", &rule(&["alice", "/data", "read"])));
        assert!(!store.contains("p", &rule(&["bob", "/data", "read"])));
    }

    #[test]
    fn test_add_duplicate() {
        let store = PolicyStore::new();
        assert!(store.add("p", rule(&["alice", "/data", "read"])));
        assert!(!store.add("p", rule(&["alice", "/data", "read"])));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_ptypes_are_separate() {
        let store = PolicyStore::new();
        store.add("p", rule(&["alice", "/data", "read"]));
        store.add("p2", rule(&["alice", "/data", "read"]));
        assert_eq!(store.rules("p").len(), 1);
        assert_eq!(store.rules("p2").len(), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_remove() {
        let store = PolicyStore::new();
        store.add("p", rule(&["alice", "/data", "read"]));
        assert!(store.remove("p", &rule(&["alice", "/data", "read"])));
        assert!(!store.remove("p", &rule(&["alice", "/data", "read"])));
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_filtered_exact_field() {
        let store = PolicyStore::new();
        store.add("p", rule(&["alice", "/data1", "read"]));
        store.add("p", rule(&["alice", "/data2", "read"]));
        store.add("p", rule(&["bob", "/data1", "read"]));

        assert!(store.remove_filtered("p", 0, &rule(&["alice"])));
        assert_eq!(store.rules("p"), vec![rule(&["bob", "/data1", "read"])]);
    }

    #[test]
    fn test_remove_filtered_skips_wildcard_fields() {
        let store = PolicyStore::new();
        store.add("p", rule(&["alice", "/data1", "read"]));
        store.add("p", rule(&["bob", "/data1", "write"]));
        store.add("p", rule(&["carol", "/data2", "read"]));

        // any subject, object /data1, any action
        assert!(store.remove_filtered("p", 0, &rule(&["", "/data1"])));
        assert_eq!(store.rules("p"), vec![rule(&["carol", "/data2", "read"])]);
    }

    #[test]
    fn test_remove_filtered_offset() {
        let store = PolicyStore::new();
        store.add("p", rule(&["alice", "/data1", "read"]));
        store.add("p", rule(&["alice", "/data1", "write"]));

        assert!(store.remove_filtered("p", 2, &rule(&["write"])));
        assert_eq!(store.rules("p"), vec![rule(&["alice", "/data1", "read"])]);
    }

    #[test]
    fn test_remove_filtered_no_match() {
        let store = PolicyStore::new();
        store.add("p", rule(&["alice", "/data1", "read"]));
        assert!(!store.remove_filtered("p", 0, &rule(&["nobody"])));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_clear() {
        let store = PolicyStore::new();
        store.add("p", rule(&["alice", "/data", "read"]));
        store.clear();
        assert!(store.is_empty());
        assert!(store.rules("p").is_empty());
    }
}
