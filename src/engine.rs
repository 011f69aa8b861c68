//! Coordinator: ties the parsed model, compiled matcher, effector, role
//! managers and policy store together, publishes the result as an
//! immutable snapshot, and routes policy mutations to the right store.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::adapter::{Adapter, FileAdapter, PolicyRow};
use crate::config::EngineConfig;
use crate::effect::{Effect, Effector};
use crate::errors::EngineError;
use crate::matcher::{self, CompiledMatcher};
use crate::model::Model;
use crate::policy::PolicyStore;
use crate::rbac::RoleManager;
use crate::registry;
use crate::watcher::{PolicyEvent, Watcher};

/// Frozen per-instance configuration read by enforcement calls.
///
/// The record itself is immutable; the role managers and policy store it
/// points to take writes through their own serialized mutators, so
/// request-time readers never coordinate with anyone.
#[derive(Debug)]
pub struct EngineSnapshot {
    pub model: Model,
    matcher: CompiledMatcher,
    effector: Effector,
    role_managers: HashMap<String, Arc<RoleManager>>,
    policy: Arc<PolicyStore>,
    /// Position of the `eft` column in the `p` definition, when declared.
    eft_index: Option<usize>,
}

impl EngineSnapshot {
    fn build(model: Model) -> Result<Self, EngineError> {
        let role_managers: HashMap<String, Arc<RoleManager>> = model
            .role
            .keys()
            .map(|key| (key.clone(), Arc::new(RoleManager::new())))
            .collect();

        let matcher = matcher::compile(&model, &role_managers)?;
        let effect_expr = Model::require(&model.effect, "policy_effect", "e")?;
        let effector = Effector::from_expr(effect_expr)?;
        let eft_index = model.policy_fields("p").and_then(|f| f.get("eft").copied());

        Ok(Self {
            model,
            matcher,
            effector,
            role_managers,
            policy: Arc::new(PolicyStore::new()),
            eft_index,
        })
    }

    /// Evaluate one request tuple against every candidate policy row and
    /// reduce the effect stream to the final decision.
    pub fn enforce(&self, request: &[&str]) -> Result<bool, EngineError> {
        let rules = self.policy.snapshot();
        let rows = rules.get("p").map(|r| r.as_slice()).unwrap_or(&[]);

        let mut error = None;
        let effects = rows.iter().map_while(|rule| {
            let values: Vec<&str> = rule.iter().map(String::as_str).collect();
            match self.matcher.eval(request, &values) {
                Ok(true) => Some(self.rule_effect(rule)),
                Ok(false) => Some(Effect::Indeterminate),
                Err(e) => {
                    error = Some(e);
                    None
                }
            }
        });
        let decision = self.effector.reduce(effects);

        match error {
            Some(e) => Err(e),
            None => Ok(decision),
        }
    }

    /// Effect of a rule the matcher accepted: `Deny` when the rule's
    /// `eft` column says so, `Allow` otherwise.
    fn rule_effect(&self, rule: &[String]) -> Effect {
        let eft = self.eft_index.and_then(|i| rule.get(i));
        match eft.map(String::as_str) {
            Some("deny") => Effect::Deny,
            _ => Effect::Allow,
        }
    }

    pub fn role_manager(&self, ptype: &str) -> Option<Arc<RoleManager>> {
        self.role_managers.get(ptype).cloned()
    }

    pub fn policy(&self) -> &PolicyStore {
        &self.policy
    }
}

/// A running engine instance.
pub struct Engine {
    config: EngineConfig,
    snapshot: ArcSwap<EngineSnapshot>,
    adapter: Option<Box<dyn Adapter>>,
    watcher: Mutex<Option<Box<dyn Watcher>>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Engine {
    /// Start an instance from configuration alone. A configured
    /// `policy_path` is loaded through a [`FileAdapter`].
    pub fn start(config: EngineConfig) -> Result<Arc<Self>, EngineError> {
        let adapter: Option<Box<dyn Adapter>> = config
            .policy_path
            .as_ref()
            .map(|p| Box::new(FileAdapter::new(p)) as Box<dyn Adapter>);
        Self::start_with(config, adapter, None)
    }

    /// Start an instance with explicit collaborators.
    pub fn start_with(
        config: EngineConfig,
        adapter: Option<Box<dyn Adapter>>,
        watcher: Option<Box<dyn Watcher>>,
    ) -> Result<Arc<Self>, EngineError> {
        let model = Model::from_file(&config.model_path)?;
        let snapshot = Arc::new(EngineSnapshot::build(model)?);

        let engine = Arc::new(Self {
            config,
            snapshot: ArcSwap::new(Arc::clone(&snapshot)),
            adapter,
            watcher: Mutex::new(watcher),
        });

        registry::publish(&engine.config.name, snapshot);
        engine.load_rules()?;

        let weak = Arc::downgrade(&engine);
        if let Some(w) = engine.watcher.lock().as_mut() {
            w.set_update_callback(Box::new(move |event| {
                if let Some(engine) = weak.upgrade() {
                    engine.apply_event(event);
                }
            }));
        }

        tracing::info!(
            name = %engine.config.name,
            rules = engine.snapshot.load().policy.len(),
            "Engine started"
        );
        Ok(engine)
    }

    /// Replace the published snapshot from the model file and adapter.
    /// Outstanding readers keep whatever snapshot they already hold.
    pub fn reload(&self) -> Result<(), EngineError> {
        let model = Model::from_file(&self.config.model_path)?;
        let snapshot = Arc::new(EngineSnapshot::build(model)?);
        if let Some(adapter) = &self.adapter {
            for row in adapter.load_policy()? {
                Self::apply_row(&snapshot, &row);
            }
        }
        self.snapshot.store(Arc::clone(&snapshot));
        registry::publish(&self.config.name, snapshot);
        tracing::info!(name = %self.config.name, "Engine reloaded");
        Ok(())
    }

    /// Erase the published snapshot and close the watcher.
    pub fn shutdown(&self) {
        registry::remove(&self.config.name);
        if let Some(mut w) = self.watcher.lock().take() {
            w.close();
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Current configuration snapshot.
    pub fn snapshot(&self) -> Arc<EngineSnapshot> {
        self.snapshot.load_full()
    }

    pub fn enforce(&self, request: &[&str]) -> Result<bool, EngineError> {
        self.snapshot.load().enforce(request)
    }

    pub fn role_manager(&self, ptype: &str) -> Option<Arc<RoleManager>> {
        self.snapshot.load().role_manager(ptype)
    }

    // ─── Policy management (ptype-dispatched write path) ────────────────

    pub fn add_policy(&self, rule: Vec<String>) -> bool {
        self.add_named_policy("p", rule)
    }

    pub fn add_named_policy(&self, ptype: &str, rule: Vec<String>) -> bool {
        let added = Self::apply_add(&self.snapshot.load(), "p", ptype, &rule);
        if added {
            self.notify(|w| w.update_for_add_policy("p", ptype, rule));
        }
        added
    }

    pub fn remove_policy(&self, rule: Vec<String>) -> bool {
        self.remove_named_policy("p", rule)
    }

    pub fn remove_named_policy(&self, ptype: &str, rule: Vec<String>) -> bool {
        let removed = Self::apply_remove(&self.snapshot.load(), "p", ptype, &rule);
        if removed {
            self.notify(|w| w.update_for_remove_policy("p", ptype, rule));
        }
        removed
    }

    pub fn add_grouping_policy(&self, rule: Vec<String>) -> bool {
        self.add_named_grouping_policy("g", rule)
    }

    pub fn add_named_grouping_policy(&self, ptype: &str, rule: Vec<String>) -> bool {
        let added = Self::apply_add(&self.snapshot.load(), "g", ptype, &rule);
        if added {
            self.notify(|w| w.update_for_add_policy("g", ptype, rule));
        }
        added
    }

    pub fn remove_grouping_policy(&self, rule: Vec<String>) -> bool {
        self.remove_named_grouping_policy("g", rule)
    }

    pub fn remove_named_grouping_policy(&self, ptype: &str, rule: Vec<String>) -> bool {
        let removed = Self::apply_remove(&self.snapshot.load(), "g", ptype, &rule);
        if removed {
            self.notify(|w| w.update_for_remove_policy("g", ptype, rule));
        }
        removed
    }

    /// Remove every `p`-section rule matching `field_values` starting at
    /// `field_index`; empty strings match anything.
    pub fn remove_filtered_policy(
        &self,
        ptype: &str,
        field_index: usize,
        field_values: Vec<String>,
    ) -> bool {
        let removed = self
            .snapshot
            .load()
            .policy
            .remove_filtered(ptype, field_index, &field_values);
        if removed {
            self.notify(|w| w.update_for_remove_filtered_policy("p", ptype, field_index, field_values));
        }
        removed
    }

    /// Drop every stored rule and role link.
    pub fn clear_policy(&self) {
        let snapshot = self.snapshot.load();
        snapshot.policy.clear();
        for rm in snapshot.role_managers.values() {
            rm.clear();
        }
        self.notify(|w| w.update());
    }

    /// Persist the full rule set through the adapter.
    pub fn save_policy(&self) -> Result<(), EngineError> {
        let rows = self.all_rows();
        let Some(adapter) = &self.adapter else {
            return Err(EngineError::Adapter("no adapter attached".into()));
        };
        adapter.save_policy(&rows)?;
        self.notify(|w| w.update_for_save_policy(rows));
        Ok(())
    }

    // ─── Internals ──────────────────────────────────────────────────────

    fn all_rows(&self) -> Vec<PolicyRow> {
        let snapshot = self.snapshot.load();
        let rules = snapshot.policy.snapshot();
        rules
            .iter()
            .flat_map(|(ptype, rows)| {
                rows.iter()
                    .map(|rule| PolicyRow::new(ptype.clone(), rule.clone()))
            })
            .collect()
    }

    fn load_rules(&self) -> Result<(), EngineError> {
        let Some(adapter) = &self.adapter else {
            return Ok(());
        };
        let rows = adapter.load_policy()?;
        let snapshot = self.snapshot.load();
        let count = rows.len();
        for row in &rows {
            Self::apply_row(&snapshot, row);
        }
        tracing::info!(name = %self.config.name, rules = count, "Loaded policy rules");
        Ok(())
    }

    fn apply_row(snapshot: &EngineSnapshot, row: &PolicyRow) {
        if !Self::apply_add(snapshot, &row.section, &row.ptype, &row.values) {
            tracing::warn!(ptype = %row.ptype, "skipped policy row");
        }
    }

    /// Route one rule to the right store. `g`-section rules land in the
    /// named role manager (and the policy store, so saves round-trip).
    fn apply_add(snapshot: &EngineSnapshot, section: &str, ptype: &str, rule: &[String]) -> bool {
        match section {
            "g" => {
                let Some(rm) = snapshot.role_managers.get(ptype) else {
                    tracing::warn!(%ptype, "no role manager for grouping rule");
                    return false;
                };
                let [from, to, rest @ ..] = rule else {
                    tracing::warn!(%ptype, "grouping rule needs at least two values");
                    return false;
                };
                let added = snapshot.policy.add(ptype, rule.to_vec());
                if added {
                    rm.add_link(from, to, rest.first().map(String::as_str));
                }
                added
            }
            "p" => snapshot.policy.add(ptype, rule.to_vec()),
            other => {
                tracing::warn!(section = %other, "unknown policy section");
                false
            }
        }
    }

    fn apply_remove(snapshot: &EngineSnapshot, section: &str, ptype: &str, rule: &[String]) -> bool {
        match section {
            "g" => {
                let Some(rm) = snapshot.role_managers.get(ptype) else {
                    return false;
                };
                let [from, to, rest @ ..] = rule else {
                    return false;
                };
                let removed = snapshot.policy.remove(ptype, rule);
                if removed {
                    rm.delete_link(from, to, rest.first().map(String::as_str));
                }
                removed
            }
            "p" => snapshot.policy.remove(ptype, rule),
            _ => false,
        }
    }

    fn notify(&self, f: impl FnOnce(&mut dyn Watcher)) {
        if let Some(w) = self.watcher.lock().as_mut() {
            f(w.as_mut());
        }
    }

    /// Apply an inbound watcher event. Mutations here do not re-notify:
    /// the event already made the rounds.
    fn apply_event(&self, event: PolicyEvent) {
        let snapshot = self.snapshot.load();
        match event {
            PolicyEvent::FullSync => {
                if let Err(e) = self.reload() {
                    tracing::error!(name = %self.config.name, error = %e, "reload failed, keeping prior state");
                }
            }
            PolicyEvent::AddPolicy { section, ptype, rule } => {
                Self::apply_add(&snapshot, &section, &ptype, &rule);
            }
            PolicyEvent::RemovePolicy { section, ptype, rule } => {
                Self::apply_remove(&snapshot, &section, &ptype, &rule);
            }
            PolicyEvent::RemoveFilteredPolicy { section, ptype, field_index, field_values } => {
                if section == "p" {
                    snapshot.policy.remove_filtered(&ptype, field_index, &field_values);
                } else if let Err(e) = self.reload() {
                    // filtered grouping removal is not applied incrementally
                    tracing::error!(name = %self.config.name, error = %e, "reload failed, keeping prior state");
                }
            }
            PolicyEvent::SavePolicy { rules } => {
                snapshot.policy.clear();
                for rm in snapshot.role_managers.values() {
                    rm.clear();
                }
                for row in &rules {
                    Self::apply_row(&snapshot, row);
                }
            }
            PolicyEvent::AddPolicies { section, ptype, rules } => {
                for rule in rules {
                    Self::apply_add(&snapshot, &section, &ptype, &rule);
                }
            }
            PolicyEvent::RemovePolicies { section, ptype, rules } => {
                for rule in rules {
                    Self::apply_remove(&snapshot, &section, &ptype, &rule);
                }
            }
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
