//! Role-inheritance graph with lock-free reads.
//!
//! The graph is stored as an immutable [`store::EdgeIndex`] snapshot behind
//! an `ArcSwap`. Readers load the current snapshot and never take a lock;
//! writers serialize on a mutex, build the next snapshot and publish it
//! atomically. Dual-index consistency holds because forward and reverse
//! tables are part of the same snapshot.

mod store;

use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

pub use store::MatchingFn;
use store::{edge_key, EdgeIndex, MatchFns};

pub struct RoleManager {
    edges: ArcSwap<EdgeIndex>,
    matchers: ArcSwap<MatchFns>,
    write_lock: Mutex<()>,
}

impl Default for RoleManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RoleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleManager")
            .field("edges", &self.edges.load().edge_count())
            .field("matchers", &**self.matchers.load())
            .finish()
    }
}

impl RoleManager {
    pub fn new() -> Self {
        Self {
            edges: ArcSwap::from_pointee(EdgeIndex::default()),
            matchers: ArcSwap::from_pointee(MatchFns::default()),
            write_lock: Mutex::new(()),
        }
    }

    // ─── Writes (serialized per instance) ───────────────────────────────

    /// Insert the edge `from → to` in `domain`. Idempotent: inserting an
    /// existing edge publishes nothing.
    pub fn add_link(&self, from: &str, to: &str, domain: Option<&str>) {
        let _guard = self.write_lock.lock();
        if let Some(next) = self.edges.load().with_link(from, to, domain) {
            self.edges.store(Arc::new(next));
        }
    }

    /// Remove the edge `from → to` in `domain`. Removing an absent edge
    /// is not an error.
    pub fn delete_link(&self, from: &str, to: &str, domain: Option<&str>) {
        let _guard = self.write_lock.lock();
        if let Some(next) = self.edges.load().without_link(from, to, domain) {
            self.edges.store(Arc::new(next));
        }
    }

    /// Drop every edge. Installed matching predicates are preserved.
    pub fn clear(&self) {
        let _guard = self.write_lock.lock();
        self.edges.store(Arc::new(EdgeIndex::default()));
    }

    /// Install or replace the role-name matching predicate. When set, it
    /// replaces `==` in the traversal match test.
    pub fn add_matching_func(&self, f: Option<MatchingFn>) {
        let _guard = self.write_lock.lock();
        let mut next = (**self.matchers.load()).clone();
        next.role = f;
        self.matchers.store(Arc::new(next));
    }

    /// Install or replace the domain matching predicate. When set,
    /// lookups widen from an exact-key probe to a scan over the subject's
    /// domains, accepting entries whose stored domain matches.
    pub fn add_domain_matching_func(&self, f: Option<MatchingFn>) {
        let _guard = self.write_lock.lock();
        let mut next = (**self.matchers.load()).clone();
        next.domain = f;
        self.matchers.store(Arc::new(next));
    }

    // ─── Reads (any thread, no coordination) ────────────────────────────

    /// Direct roles of `subject` in `domain`. Order unspecified.
    pub fn get_roles(&self, subject: &str, domain: Option<&str>) -> Vec<String> {
        let edges = self.edges.load();
        let matchers = self.matchers.load();

        if let (Some(domain_match), Some(requested)) = (&matchers.domain, domain) {
            let mut roles = Vec::new();
            for ((from, stored), tos) in edges.forward.iter() {
                if from != subject {
                    continue;
                }
                if let Some(stored) = stored {
                    if domain_match(requested, stored) {
                        roles.extend(tos.iter().cloned());
                    }
                }
            }
            return roles;
        }

        edges
            .forward
            .get(&edge_key(subject, domain))
            .map(|tos| tos.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Direct members of `role` in `domain`, via the reverse index. The
    /// domain matcher widens this symmetrically to [`Self::get_roles`].
    pub fn get_users(&self, role: &str, domain: Option<&str>) -> Vec<String> {
        let edges = self.edges.load();
        let matchers = self.matchers.load();

        if let (Some(domain_match), Some(requested)) = (&matchers.domain, domain) {
            let mut users = Vec::new();
            for ((to, stored), froms) in edges.reverse.iter() {
                if to != role {
                    continue;
                }
                if let Some(stored) = stored {
                    if domain_match(requested, stored) {
                        users.extend(froms.iter().cloned());
                    }
                }
            }
            return users;
        }

        edges
            .reverse
            .get(&edge_key(role, domain))
            .map(|froms| froms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Is `to` reachable from `from` in `domain`? Reflexive, cycle-safe,
    /// and total. The traversal never leaves the requested domain except
    /// through the domain matcher.
    pub fn has_link(&self, from: &str, to: &str, domain: Option<&str>) -> bool {
        if from == to {
            return true;
        }

        let matchers = self.matchers.load();

        // Exact-edge probe before walking; only valid with plain equality.
        if matchers.role.is_none() && self.edges.load().contains(from, to, domain) {
            return true;
        }

        let mut stack = vec![from.to_string()];
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(from.to_string());

        while let Some(current) = stack.pop() {
            let matched = match &matchers.role {
                Some(role_match) => role_match(&current, to),
                None => current == to,
            };
            if matched {
                return true;
            }
            for role in self.get_roles(&current, domain) {
                if visited.insert(role.clone()) {
                    stack.push(role);
                }
            }
        }

        false
    }

    /// Log every stored edge at info level.
    pub fn print_roles(&self) {
        let edges = self.edges.load();
        for ((from, domain), tos) in edges.forward.iter() {
            for to in tos {
                match domain {
                    Some(domain) => tracing::info!(%from, %to, %domain, "role link"),
                    None => tracing::info!(%from, %to, "role link"),
                }
            }
        }
    }

    pub fn edge_count(&self) -> usize {
        self.edges.load().edge_count()
    }
}
