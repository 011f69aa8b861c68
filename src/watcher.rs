//! Cross-node change notification.
//!
//! A watcher broadcasts local policy mutations to peer nodes and delivers
//! inbound events through a registered callback. The transport lives
//! outside this crate; the coordinator only speaks this interface.

use crate::adapter::PolicyRow;

/// Payload of one broadcast change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyEvent {
    /// Policy changed in an unspecified way; receivers should reload.
    FullSync,
    AddPolicy {
        section: String,
        ptype: String,
        rule: Vec<String>,
    },
    RemovePolicy {
        section: String,
        ptype: String,
        rule: Vec<String>,
    },
    RemoveFilteredPolicy {
        section: String,
        ptype: String,
        field_index: usize,
        field_values: Vec<String>,
    },
    SavePolicy {
        rules: Vec<PolicyRow>,
    },
    AddPolicies {
        section: String,
        ptype: String,
        rules: Vec<Vec<String>>,
    },
    RemovePolicies {
        section: String,
        ptype: String,
        rules: Vec<Vec<String>>,
    },
}

pub type UpdateCallback = Box<dyn Fn(PolicyEvent) + Send + Sync>;

/// Broadcast interface consumed by the coordinator. Implementations only
/// need [`Watcher::notify`] plus callback registration; the `update_for_*`
/// family wraps event construction.
pub trait Watcher: Send + Sync {
    /// Broadcast one event to peer nodes.
    fn notify(&mut self, event: PolicyEvent);

    /// Register the callback invoked for events arriving from peers.
    fn set_update_callback(&mut self, callback: UpdateCallback);

    /// Tear down the transport. Further notifications are dropped.
    fn close(&mut self);

    fn update(&mut self) {
        self.notify(PolicyEvent::FullSync);
    }

    fn update_for_add_policy(&mut self, section: &str, ptype: &str, rule: Vec<String>) {
        self.notify(PolicyEvent::AddPolicy {
            section: section.to_string(),
            ptype: ptype.to_string(),
            rule,
        });
    }

    fn update_for_remove_policy(&mut self, section: &str, ptype: &str, rule: Vec<String>) {
        self.notify(PolicyEvent::RemovePolicy {
            section: section.to_string(),
            ptype: ptype.to_string(),
            rule,
        });
    }

    fn update_for_remove_filtered_policy(
        &mut self,
        section: &str,
        ptype: &str,
        field_index: usize,
        field_values: Vec<String>,
    ) {
        self.notify(PolicyEvent::RemoveFilteredPolicy {
            section: section.to_string(),
            ptype: ptype.to_string(),
            field_index,
            field_values,
        });
    }

    fn update_for_save_policy(&mut self, rules: Vec<PolicyRow>) {
        self.notify(PolicyEvent::SavePolicy { rules });
    }

    fn update_for_add_policies(&mut self, section: &str, ptype: &str, rules: Vec<Vec<String>>) {
        self.notify(PolicyEvent::AddPolicies {
            section: section.to_string(),
            ptype: ptype.to_string(),
            rules,
        });
    }

    fn update_for_remove_policies(&mut self, section: &str, ptype: &str, rules: Vec<Vec<String>>) {
        self.notify(PolicyEvent::RemovePolicies {
            section: section.to_string(),
            ptype: ptype.to_string(),
            rules,
        });
    }
}
