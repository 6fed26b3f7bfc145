//! Allocator: entry point combining selection, placement, claims and
//! network classification over one store.

use std::time::{SystemTime, UNIX_EPOCH};

use metal_core::{Machine, MachineAllocation, Network};
use metal_placement::{pick, spread_across_racks};
use metal_state::{MachineSearchQuery, StateStore};
use rand::{CryptoRng, Rng};
use tracing::{debug, info, warn};

use crate::candidates::find_candidates;
use crate::claim;
use crate::classify::{AllocationNetworkMap, gather_networks};
use crate::error::{AllocationError, AllocationResult};
use crate::request::AllocationSpec;
use crate::validate::validate_allocation_spec;

/// Allocation engine over a shared [`StateStore`].
///
/// Stateless besides the store handle; clones share the same database.
#[derive(Clone)]
pub struct Allocator {
    store: StateStore,
}

impl Allocator {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Select a live, free machine spread across racks and claim it.
    ///
    /// A lost claim race surfaces as
    /// [`AllocationError::ConcurrentModification`]; retrying is up to the
    /// caller.
    pub fn select_and_claim<R: Rng + CryptoRng>(
        &self,
        project_id: &str,
        partition_id: &str,
        size_id: &str,
        tags: &[String],
        rng: &mut R,
    ) -> AllocationResult<Machine> {
        let candidates = find_candidates(&self.store, partition_id, size_id)?;
        let project_machines = self
            .store
            .search_machines(&MachineSearchQuery::project_machines(project_id, partition_id))?;

        let spread = spread_across_racks(&candidates, &project_machines, tags);
        let chosen = pick(&spread, rng).ok_or_else(|| AllocationError::NoMachineAvailable {
            partition: partition_id.to_string(),
            size: size_id.to_string(),
        })?;
        debug!(
            machine = %chosen.id,
            rack = %chosen.rack_id,
            eligible = spread.len(),
            "machine selected"
        );

        claim::claim(&self.store, chosen)
    }

    /// Validate an allocation request and resolve its networks.
    pub fn validate_and_classify(
        &self,
        spec: &AllocationSpec,
        partition_id: &str,
        partition_super_networks: &[Network],
    ) -> AllocationResult<AllocationNetworkMap> {
        validate_allocation_spec(spec)?;
        gather_networks(&self.store, spec, partition_id, partition_super_networks)
    }

    /// Attach the allocation described by `spec` and `networks` to a
    /// claimed machine and tag it with the request's placement tags.
    pub fn finalize(
        &self,
        machine: &Machine,
        spec: &AllocationSpec,
        networks: &AllocationNetworkMap,
    ) -> AllocationResult<Machine> {
        let allocation = MachineAllocation {
            name: spec.name.clone(),
            creator: spec.creator.clone(),
            project: spec.project_id.clone(),
            role: spec.role,
            ssh_pub_keys: spec.ssh_pub_keys.clone(),
            networks: networks.values().map(|n| n.to_machine_network()).collect(),
            created_at: epoch_secs(),
        };
        claim::finalize(&self.store, machine, allocation, &spec.tags)
    }

    /// Return a machine to the pool.
    pub fn release(&self, machine_id: &str) -> AllocationResult<Machine> {
        claim::release(&self.store, machine_id)
    }

    /// Claim one specific machine instead of placing one.
    pub fn claim_machine(&self, machine_id: &str) -> AllocationResult<Machine> {
        let machine = self
            .store
            .get_machine(machine_id)?
            .ok_or_else(|| AllocationError::MachineNotFound(machine_id.to_string()))?;
        if !machine.is_free() || machine.preallocated {
            return Err(AllocationError::MachineAlreadyAllocated(machine.id));
        }
        claim::claim(&self.store, &machine)
    }

    /// Run the full allocation: validate, classify, claim, finalize.
    ///
    /// Nothing is written until the request is fully classified. A claim
    /// whose finalization fails is released again before the error is
    /// returned.
    pub fn allocate<R: Rng + CryptoRng>(
        &self,
        spec: &AllocationSpec,
        rng: &mut R,
    ) -> AllocationResult<Machine> {
        validate_allocation_spec(spec)?;

        let explicit = spec.machine_id.as_deref().filter(|id| !id.is_empty());
        let partition_id = match explicit {
            Some(id) => self
                .store
                .get_machine(id)?
                .ok_or_else(|| AllocationError::MachineNotFound(id.to_string()))?
                .partition_id,
            None => spec.partition_id.clone().unwrap_or_default(),
        };
        let supers = self.store.partition_super_networks()?;
        let networks = gather_networks(&self.store, spec, &partition_id, &supers)?;

        let claimed = match explicit {
            Some(id) => self.claim_machine(id)?,
            None => {
                let size_id = spec.size_id.as_deref().unwrap_or_default();
                self.select_and_claim(&spec.project_id, &partition_id, size_id, &spec.tags, rng)?
            }
        };

        match self.finalize(&claimed, spec, &networks) {
            Ok(machine) => {
                info!(machine = %machine.id, project = %spec.project_id, "machine allocated");
                Ok(machine)
            }
            Err(e) => Err(self.unwind_claim(&claimed.id, e)),
        }
    }

    /// Release a claim after a failed step and hand back the failure.
    fn unwind_claim(&self, machine_id: &str, cause: AllocationError) -> AllocationError {
        if let Err(e) = self.release(machine_id) {
            warn!(machine = %machine_id, error = %e, "failed to release claim");
        }
        cause
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
