//! Network gathering and classification.
//!
//! Resolves the networks and IPs of an allocation request into an
//! attachment plan. Every network is assigned one [`NetworkType`]; IPs are
//! bound to the requested network they belong to; networks without
//! explicit IPs are marked for automatic acquisition.
//!
//! The outcome depends only on the set of requested networks, not on
//! their order:
//!
//! 1. duplicate ids
//! 2. private super network of the target partition
//! 3. lookup and forbidden kinds, by network id
//! 4. private network counting rules
//! 5. ownership and partition of each private network, by network id
//! 6. explicit IPs
//! 7. auto-acquisition flags, by network id

use std::collections::{BTreeMap, HashSet};
use std::net::IpAddr;

use metal_core::{Ip, MachineNetwork, Network, NetworkId, NetworkKind, NetworkType, Role};
use metal_state::StateStore;
use tracing::debug;

use crate::error::{AllocationError, AllocationResult};
use crate::request::{AllocationNetworkRequest, AllocationSpec};

/// One network of the attachment plan.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationNetwork {
    pub network: Network,
    pub network_type: NetworkType,
    pub ips: Vec<Ip>,
    /// The IPAM collaborator leases an address for this network.
    pub auto: bool,
}

impl AllocationNetwork {
    pub fn to_machine_network(&self) -> MachineNetwork {
        MachineNetwork {
            network_id: self.network.id.clone(),
            ips: self.ips.iter().map(|ip| ip.address).collect(),
            auto_acquire_ip: self.auto,
            network_type: self.network_type,
        }
    }
}

/// Attachment plan keyed by network id.
pub type AllocationNetworkMap = BTreeMap<NetworkId, AllocationNetwork>;

/// Build the attachment plan for `spec` in `partition_id`.
///
/// `partition_super_networks` holds the private super networks of all
/// partitions. Expects a request that passed structural validation.
pub fn gather_networks(
    store: &StateStore,
    spec: &AllocationSpec,
    partition_id: &str,
    partition_super_networks: &[Network],
) -> AllocationResult<AllocationNetworkMap> {
    let mut seen = HashSet::new();
    if !spec.networks.iter().all(|n| seen.insert(n.network_id.as_str())) {
        return Err(AllocationError::DuplicateNetworkId);
    }

    let super_network = partition_super_networks
        .iter()
        .find(|n| n.is_private_super() && n.partition_id.as_deref() == Some(partition_id))
        .ok_or_else(|| AllocationError::NoPrivateSuperNetwork(partition_id.to_string()))?;

    let mut requested: Vec<&AllocationNetworkRequest> = spec.networks.iter().collect();
    requested.sort_by(|a, b| a.network_id.cmp(&b.network_id));

    let mut networks = Vec::with_capacity(requested.len());
    for req in requested {
        let network = store
            .get_network(&req.network_id)?
            .ok_or_else(|| AllocationError::NetworkNotFound(req.network_id.clone()))?;
        let kind = AttachableKind::of(&network)?;
        networks.push((req, network, kind));
    }

    let unshared = networks
        .iter()
        .filter(|(_, _, kind)| *kind == AttachableKind::Private { shared: false })
        .count();
    let shared = networks
        .iter()
        .filter(|(_, _, kind)| *kind == AttachableKind::Private { shared: true })
        .count();
    check_private_counts(spec.role, unshared, shared)?;

    for (_, network, kind) in &networks {
        if let AttachableKind::Private { .. } = kind {
            check_private_network(network, &spec.project_id, partition_id, &super_network.id)?;
        }
    }

    let mut plan: AllocationNetworkMap = networks
        .into_iter()
        .map(|(req, network, kind)| {
            let entry = AllocationNetwork {
                network,
                network_type: resolve_type(kind, unshared > 0),
                ips: Vec::new(),
                auto: req.wants_auto(),
            };
            (req.network_id.clone(), entry)
        })
        .collect();

    for literal in &spec.ips {
        let address: IpAddr = literal.parse().map_err(|_| {
            AllocationError::InvalidSpec(format!("{literal:?} is not a valid IP address"))
        })?;
        let ip = store
            .get_ip(&address)?
            .ok_or(AllocationError::IpNotFound(address))?;

        let Some(entry) = plan.get_mut(&ip.network_id) else {
            return Err(AllocationError::IpNotInAnyRequestedNetwork(address));
        };
        if ip.project_id != spec.project_id {
            return Err(AllocationError::IpProjectMismatch {
                ip: address,
                ip_project: ip.project_id,
                project: spec.project_id.clone(),
            });
        }
        if !entry.ips.iter().any(|known| known.address == address) {
            entry.ips.push(ip);
        }
        entry.auto = false;
    }

    for (id, entry) in &plan {
        if !entry.auto && entry.ips.is_empty() {
            return Err(AllocationError::MissingIpForNetwork {
                network_id: id.clone(),
                kind: entry.network.kind.name(),
            });
        }
    }

    debug!(
        project = %spec.project_id,
        partition = %partition_id,
        networks = plan.len(),
        "networks classified"
    );
    Ok(plan)
}

fn check_private_counts(role: Role, unshared: usize, shared: usize) -> AllocationResult<()> {
    if unshared + shared == 0 {
        return Err(AllocationError::NoPrivateNetwork);
    }
    if unshared > 1 {
        return Err(AllocationError::MultiplePrimaryPrivateNetworks);
    }
    match role {
        Role::Machine if unshared + shared > 1 => {
            Err(AllocationError::MultiplePrivateNetworksForMachine)
        }
        Role::Firewall if unshared == 0 && shared > 1 => {
            Err(AllocationError::FirewallMultipleSharedNetworks)
        }
        _ => Ok(()),
    }
}

/// Shared networks need no ownership, unshared ones must belong to the
/// project. Both must be carved out of the partition's super network.
fn check_private_network(
    network: &Network,
    project_id: &str,
    partition_id: &str,
    super_network_id: &str,
) -> AllocationResult<()> {
    if !network.is_shared() && network.project_id.as_deref() != Some(project_id) {
        return Err(AllocationError::PrivateNetworkForeignProject {
            network_id: network.id.clone(),
        });
    }

    let in_partition = network.partition_id.as_deref() == Some(partition_id)
        && matches!(
            &network.kind,
            NetworkKind::Private { parent_network_id, .. } if parent_network_id == super_network_id
        );
    if !in_partition {
        return Err(AllocationError::PrivateNetworkWrongPartition {
            network_id: network.id.clone(),
        });
    }
    Ok(())
}

/// Kind of a network that may be attached to a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttachableKind {
    External,
    Private { shared: bool },
}

impl AttachableKind {
    fn of(network: &Network) -> AllocationResult<Self> {
        match &network.kind {
            NetworkKind::External => Ok(Self::External),
            NetworkKind::Private { shared, .. } => Ok(Self::Private { shared: *shared }),
            NetworkKind::PrivateSuper | NetworkKind::Underlay => {
                Err(AllocationError::ForbiddenNetworkKind {
                    network_id: network.id.clone(),
                    kind: network.kind.name(),
                })
            }
        }
    }
}

fn resolve_type(kind: AttachableKind, has_unshared_primary: bool) -> NetworkType {
    match kind {
        AttachableKind::External => NetworkType::External,
        AttachableKind::Private { shared: false } => NetworkType::PrivatePrimaryUnshared,
        AttachableKind::Private { shared: true } if has_unshared_primary => {
            NetworkType::PrivateSecondaryShared
        }
        AttachableKind::Private { shared: true } => NetworkType::PrivatePrimaryShared,
    }
}
