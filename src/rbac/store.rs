use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Index key: `(name, domain)`. `None` is the global domain.
pub(crate) type EdgeKey = (String, Option<String>);

pub(crate) fn edge_key(name: &str, domain: Option<&str>) -> EdgeKey {
    (name.to_string(), domain.map(|d| d.to_string()))
}

/// Immutable snapshot of the role-inheritance graph.
///
/// Both directions live in one snapshot, so a reader either sees an edge
/// in both indexes or in neither. Writers clone, mutate and republish.
#[derive(Debug, Clone, Default)]
pub(crate) struct EdgeIndex {
    /// `(from, domain)` → set of `to`
    pub forward: HashMap<EdgeKey, HashSet<String>>,
    /// `(to, domain)` → set of `from`
    pub reverse: HashMap<EdgeKey, HashSet<String>>,
}

impl EdgeIndex {
    pub fn contains(&self, from: &str, to: &str, domain: Option<&str>) -> bool {
        self.forward
            .get(&edge_key(from, domain))
            .is_some_and(|tos| tos.contains(to))
    }

    /// Next snapshot with the edge added, or `None` if it is already there.
    pub fn with_link(&self, from: &str, to: &str, domain: Option<&str>) -> Option<Self> {
        if self.contains(from, to, domain) {
            return None;
        }
        let mut next = self.clone();
        next.forward
            .entry(edge_key(from, domain))
            .or_default()
            .insert(to.to_string());
        next.reverse
            .entry(edge_key(to, domain))
            .or_default()
            .insert(from.to_string());
        Some(next)
    }

    /// Next snapshot with the edge removed, or `None` if it was absent.
    pub fn without_link(&self, from: &str, to: &str, domain: Option<&str>) -> Option<Self> {
        if !self.contains(from, to, domain) {
            return None;
        }
        let mut next = self.clone();
        let fkey = edge_key(from, domain);
        if let Some(tos) = next.forward.get_mut(&fkey) {
            tos.remove(to);
            if tos.is_empty() {
                next.forward.remove(&fkey);
            }
        }
        let rkey = edge_key(to, domain);
        if let Some(froms) = next.reverse.get_mut(&rkey) {
            froms.remove(from);
            if froms.is_empty() {
                next.reverse.remove(&rkey);
            }
        }
        Some(next)
    }

    pub fn edge_count(&self) -> usize {
        self.forward.values().map(|tos| tos.len()).sum()
    }
}

/// User-installed name-matching predicate.
pub type MatchingFn = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// Predicate slots consulted on the read path. Swapped as a unit so a
/// traversal sees one consistent pair.
#[derive(Clone, Default)]
pub(crate) struct MatchFns {
    /// `(candidate, target)` — replaces `==` during the traversal match test.
    pub role: Option<MatchingFn>,
    /// `(requested_domain, stored_domain)` — widens lookups to a domain scan.
    pub domain: Option<MatchingFn>,
}

impl std::fmt::Debug for MatchFns {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchFns")
            .field("role", &self.role.is_some())
            .field("domain", &self.domain.is_some())
            .finish()
    }
}
