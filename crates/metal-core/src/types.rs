//! Domain types for machines, allocations, networks and IPs.
//!
//! These types represent the persisted inventory of a metal partition.
//! All types are serializable to/from JSON for storage in redb tables.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Unique identifier for a machine (hardware UUID).
pub type MachineId = String;

/// Unique identifier for a network.
pub type NetworkId = String;

/// Unique identifier for a tenant project.
pub type ProjectId = String;

// ── Machine ───────────────────────────────────────────────────────

/// A physical machine registered in the inventory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Machine {
    pub id: MachineId,
    #[serde(default)]
    pub name: String,
    pub partition_id: String,
    pub size_id: String,
    pub rack_id: String,
    pub state: MachineState,
    /// Set by the machine itself while it idles in the pool waiting for an allocation.
    pub waiting: bool,
    /// Transient claim marker set before the allocation is finalized.
    pub preallocated: bool,
    /// Present iff the machine is bound to a tenant.
    pub allocation: Option<MachineAllocation>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Version marker bumped by the store on every successful write.
    #[serde(default)]
    pub changed: u64,
}

impl Machine {
    /// Whether the machine is free for a new allocation.
    pub fn is_free(&self) -> bool {
        self.allocation.is_none()
    }

    /// Project the machine is allocated to, if any.
    pub fn project(&self) -> Option<&str> {
        self.allocation.as_ref().map(|a| a.project.as_str())
    }
}

/// Administrative state of a machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MachineState {
    pub value: MachineStateValue,
    #[serde(default)]
    pub description: String,
}

/// Administrative state values. Only `Available` machines are handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MachineStateValue {
    #[default]
    Available,
    Reserved,
    Locked,
}

/// Tenant-visible role of an allocated machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Machine,
    Firewall,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Machine => f.write_str("machine"),
            Role::Firewall => f.write_str("firewall"),
        }
    }
}

/// The binding of a machine to a tenant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MachineAllocation {
    pub name: String,
    pub creator: String,
    pub project: ProjectId,
    pub role: Role,
    #[serde(default)]
    pub ssh_pub_keys: Vec<String>,
    /// Resolved network attachments.
    pub networks: Vec<MachineNetwork>,
    /// Unix timestamp (seconds) when the allocation was finalized.
    pub created_at: u64,
}

/// One resolved network attachment of an allocated machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MachineNetwork {
    pub network_id: NetworkId,
    pub ips: Vec<IpAddr>,
    pub auto_acquire_ip: bool,
    pub network_type: NetworkType,
}

// ── Network ───────────────────────────────────────────────────────

/// Resolved semantic type of a requested network within one allocation.
///
/// Super and underlay networks never appear here, they cannot be targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkType {
    PrivatePrimaryUnshared,
    PrivatePrimaryShared,
    PrivateSecondaryShared,
    External,
}

impl NetworkType {
    pub fn is_private(self) -> bool {
        !matches!(self, NetworkType::External)
    }

    pub fn is_primary(self) -> bool {
        matches!(
            self,
            NetworkType::PrivatePrimaryUnshared | NetworkType::PrivatePrimaryShared
        )
    }
}

/// A network of the data center.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Network {
    pub id: NetworkId,
    #[serde(default)]
    pub name: String,
    /// Owning project. Absent for infrastructure networks.
    pub project_id: Option<ProjectId>,
    /// Absent for global networks (e.g. the internet).
    pub partition_id: Option<String>,
    #[serde(default)]
    pub prefixes: Vec<String>,
    pub kind: NetworkKind,
}

/// Topology kind of a network. The variants are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NetworkKind {
    /// Per-partition parent of all tenant private networks.
    PrivateSuper,
    /// Infrastructure network connecting switches and machines.
    Underlay,
    /// Tenant network carved out of a private super network.
    Private {
        parent_network_id: NetworkId,
        /// Usable as a private attachment point by projects that do not own it.
        #[serde(default)]
        shared: bool,
    },
    /// Externally routed network such as the internet.
    External,
}

impl NetworkKind {
    pub fn name(&self) -> &'static str {
        match self {
            NetworkKind::PrivateSuper => "private super",
            NetworkKind::Underlay => "underlay",
            NetworkKind::Private { shared: true, .. } => "private shared",
            NetworkKind::Private { shared: false, .. } => "private",
            NetworkKind::External => "external",
        }
    }
}

impl Network {
    pub fn is_private(&self) -> bool {
        matches!(self.kind, NetworkKind::Private { .. })
    }

    pub fn is_shared(&self) -> bool {
        matches!(self.kind, NetworkKind::Private { shared: true, .. })
    }

    pub fn is_private_super(&self) -> bool {
        self.kind == NetworkKind::PrivateSuper
    }
}

// ── IP ────────────────────────────────────────────────────────────

/// An IP address leased out of a network by the IPAM collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ip {
    pub address: IpAddr,
    #[serde(default)]
    pub name: String,
    pub project_id: ProjectId,
    pub network_id: NetworkId,
}

impl Ip {
    /// Build the key for the ips table.
    pub fn table_key(&self) -> String {
        self.address.to_string()
    }
}

// ── Liveliness ────────────────────────────────────────────────────

/// Most recent health classification of a machine, derived from its
/// provisioning events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Liveliness {
    Alive,
    Dead,
    Unknown,
}

impl std::str::FromStr for Liveliness {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "alive" => Ok(Liveliness::Alive),
            "dead" => Ok(Liveliness::Dead),
            "unknown" => Ok(Liveliness::Unknown),
            other => Err(format!("unknown liveliness: {other}")),
        }
    }
}

/// Liveliness record of one machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProvisioningEventContainer {
    pub machine_id: MachineId,
    pub liveliness: Liveliness,
    /// Unix timestamp (seconds) of the last received event.
    pub last_event_time: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_kind_serializes_tagged() {
        let kind = NetworkKind::Private {
            parent_network_id: "super-1".to_string(),
            shared: true,
        };
        let json = serde_json::to_string(&kind).unwrap();
        assert_eq!(
            json,
            r#"{"type":"private","parent_network_id":"super-1","shared":true}"#
        );

        let parsed: NetworkKind = serde_json::from_str(r#"{"type":"external"}"#).unwrap();
        assert_eq!(parsed, NetworkKind::External);
    }

    #[test]
    fn shared_defaults_to_false() {
        let parsed: NetworkKind =
            serde_json::from_str(r#"{"type":"private","parent_network_id":"s"}"#).unwrap();
        assert_eq!(
            parsed,
            NetworkKind::Private {
                parent_network_id: "s".to_string(),
                shared: false
            }
        );
    }

    #[test]
    fn network_type_predicates() {
        assert!(NetworkType::PrivatePrimaryShared.is_primary());
        assert!(NetworkType::PrivateSecondaryShared.is_private());
        assert!(!NetworkType::PrivateSecondaryShared.is_primary());
        assert!(!NetworkType::External.is_private());
    }

    #[test]
    fn liveliness_parses_case_insensitive() {
        assert_eq!("Alive".parse::<Liveliness>(), Ok(Liveliness::Alive));
        assert_eq!("DEAD".parse::<Liveliness>(), Ok(Liveliness::Dead));
        assert!("zombie".parse::<Liveliness>().is_err());
    }

    #[test]
    fn machine_without_allocation_is_free() {
        let machine: Machine = serde_json::from_str(
            r#"{
                "id": "m1",
                "partition_id": "p1",
                "size_id": "s1",
                "rack_id": "r1",
                "state": {"value": "available"},
                "waiting": true,
                "preallocated": false,
                "allocation": null
            }"#,
        )
        .unwrap();
        assert!(machine.is_free());
        assert_eq!(machine.project(), None);
        assert_eq!(machine.changed, 0);
        assert!(machine.tags.is_empty());
    }
}
