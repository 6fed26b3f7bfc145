//! Predicate set for machine searches.
//!
//! Every populated field narrows the result; unset fields match anything.
//! Evaluated against deserialized records inside a read transaction.

use serde::{Deserialize, Serialize};

use metal_core::{Machine, MachineStateValue, Role};

/// Search filter for [`crate::StateStore::search_machines`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MachineSearchQuery {
    pub id: Option<String>,
    pub name: Option<String>,
    pub partition_id: Option<String>,
    pub size_id: Option<String>,
    pub rack_id: Option<String>,
    /// All listed tags must be present on the machine.
    pub tags: Vec<String>,

    /// `Some(false)` selects free machines, `Some(true)` allocated ones.
    pub allocated: Option<bool>,
    pub allocation_project: Option<String>,
    pub allocation_name: Option<String>,
    pub allocation_role: Option<Role>,
    /// All listed networks must be attached to the allocation.
    pub network_ids: Vec<String>,

    pub state_value: Option<MachineStateValue>,
    pub waiting: Option<bool>,
    pub preallocated: Option<bool>,
}

impl MachineSearchQuery {
    /// Free, available machines of a size waiting in a partition that
    /// nobody has claimed yet.
    pub fn waiting_candidates(partition_id: &str, size_id: &str) -> Self {
        Self {
            partition_id: Some(partition_id.to_string()),
            size_id: Some(size_id.to_string()),
            allocated: Some(false),
            state_value: Some(MachineStateValue::Available),
            waiting: Some(true),
            preallocated: Some(false),
            ..Default::default()
        }
    }

    /// Machines allocated to a project within a partition, in any state.
    pub fn project_machines(project_id: &str, partition_id: &str) -> Self {
        Self {
            allocation_project: Some(project_id.to_string()),
            partition_id: Some(partition_id.to_string()),
            ..Default::default()
        }
    }

    pub fn matches(&self, m: &Machine) -> bool {
        fn eq(want: &Option<String>, have: &str) -> bool {
            want.as_deref().is_none_or(|w| w == have)
        }

        if !(eq(&self.id, &m.id)
            && eq(&self.name, &m.name)
            && eq(&self.partition_id, &m.partition_id)
            && eq(&self.size_id, &m.size_id)
            && eq(&self.rack_id, &m.rack_id))
        {
            return false;
        }

        if !self.tags.iter().all(|t| m.tags.contains(t)) {
            return false;
        }

        if self.allocated.is_some_and(|a| a != m.allocation.is_some()) {
            return false;
        }

        let wants_allocation = self.allocation_project.is_some()
            || self.allocation_name.is_some()
            || self.allocation_role.is_some()
            || !self.network_ids.is_empty();
        if wants_allocation {
            let Some(alloc) = &m.allocation else {
                return false;
            };
            if !(eq(&self.allocation_project, &alloc.project)
                && eq(&self.allocation_name, &alloc.name))
            {
                return false;
            }
            if self.allocation_role.is_some_and(|r| r != alloc.role) {
                return false;
            }
            let attached = self
                .network_ids
                .iter()
                .all(|id| alloc.networks.iter().any(|n| &n.network_id == id));
            if !attached {
                return false;
            }
        }

        self.state_value.is_none_or(|s| s == m.state.value)
            && self.waiting.is_none_or(|w| w == m.waiting)
            && self.preallocated.is_none_or(|p| p == m.preallocated)
    }
}
