//! Allocation requests as submitted by tenants.

use serde::{Deserialize, Serialize};

use metal_core::Role;

/// What a tenant asks for when allocating a machine.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AllocationSpec {
    pub name: String,
    pub creator: String,
    pub project_id: String,
    pub role: Role,
    /// Allocate exactly this machine instead of placing one.
    pub machine_id: Option<String>,
    /// Required when no machine id is given.
    pub partition_id: Option<String>,
    /// Required when no machine id is given.
    pub size_id: Option<String>,
    pub networks: Vec<AllocationNetworkRequest>,
    /// Explicit IP literals, each of which must belong to a requested network.
    pub ips: Vec<String>,
    pub ssh_pub_keys: Vec<String>,
    /// Placement tags for rack spreading.
    pub tags: Vec<String>,
}

/// One requested network attachment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AllocationNetworkRequest {
    pub network_id: String,
    /// Absent means auto-acquire.
    #[serde(default)]
    pub auto_acquire_ip: Option<bool>,
}

impl AllocationNetworkRequest {
    pub fn new(network_id: impl Into<String>) -> Self {
        Self {
            network_id: network_id.into(),
            auto_acquire_ip: None,
        }
    }

    pub fn with_auto(network_id: impl Into<String>, auto: bool) -> Self {
        Self {
            network_id: network_id.into(),
            auto_acquire_ip: Some(auto),
        }
    }

    /// Whether the tenant left auto-acquisition on (explicitly or by default).
    pub fn wants_auto(&self) -> bool {
        self.auto_acquire_ip.unwrap_or(true)
    }
}

impl AllocationSpec {
    pub(crate) fn has_machine_id(&self) -> bool {
        is_given(&self.machine_id)
    }

    pub(crate) fn has_partition_id(&self) -> bool {
        is_given(&self.partition_id)
    }

    pub(crate) fn has_size_id(&self) -> bool {
        is_given(&self.size_id)
    }
}

fn is_given(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}
