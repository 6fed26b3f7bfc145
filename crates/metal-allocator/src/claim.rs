//! Optimistic claim, finalization and release of machines.
//!
//! Every mutation goes through [`StateStore::update_machine`], which only
//! succeeds while the stored `changed` marker equals the one on the
//! caller's copy. There is no other locking and no retry in here.

use metal_core::{Machine, MachineAllocation};
use metal_state::{StateError, StateStore};
use tracing::{debug, info};

use crate::error::{AllocationError, AllocationResult};

/// Mark `machine` as pre-allocated.
///
/// `machine` must be the copy last read from the store. Fails with
/// [`AllocationError::ConcurrentModification`] when the record changed
/// since.
pub fn claim(store: &StateStore, machine: &Machine) -> AllocationResult<Machine> {
    let mut claimed = machine.clone();
    claimed.preallocated = true;

    let claimed = replace(store, machine, &claimed)?;
    info!(machine = %claimed.id, rack = %claimed.rack_id, "machine claimed");
    Ok(claimed)
}

/// Attach an allocation to a claimed machine.
///
/// `tags` are the placement tags of the request. They are merged into the
/// machine's tags so later tag spreading sees them.
pub fn finalize(
    store: &StateStore,
    machine: &Machine,
    allocation: MachineAllocation,
    tags: &[String],
) -> AllocationResult<Machine> {
    if !machine.preallocated || machine.allocation.is_some() {
        return Err(AllocationError::MachineNotClaimed(machine.id.clone()));
    }

    let project = allocation.project.clone();
    let mut allocated = machine.clone();
    allocated.allocation = Some(allocation);
    allocated.waiting = false;
    for tag in tags {
        if !allocated.tags.contains(tag) {
            allocated.tags.push(tag.clone());
        }
    }

    let allocated = replace(store, machine, &allocated)?;
    info!(machine = %allocated.id, %project, "allocation finalized");
    Ok(allocated)
}

/// Clear the allocation of a machine and return it to the pool.
///
/// Also unwinds a bare claim that was never finalized. A machine that is
/// neither claimed nor allocated is left alone.
pub fn release(store: &StateStore, machine_id: &str) -> AllocationResult<Machine> {
    let machine = store
        .get_machine(machine_id)?
        .ok_or_else(|| AllocationError::MachineNotFound(machine_id.to_string()))?;
    if !machine.preallocated && machine.is_free() {
        return Err(AllocationError::MachineNotClaimed(machine.id));
    }

    let mut released = machine.clone();
    released.allocation = None;
    released.tags.clear();
    released.waiting = false;
    released.preallocated = false;

    let released = replace(store, &machine, &released)?;
    info!(machine = %released.id, "machine released");
    Ok(released)
}

fn replace(store: &StateStore, old: &Machine, new: &Machine) -> AllocationResult<Machine> {
    match store.update_machine(old, new) {
        Ok(updated) => Ok(updated),
        Err(e @ StateError::Conflict { .. }) => {
            debug!(machine = %old.id, error = %e, "lost claim race");
            Err(e.into())
        }
        Err(StateError::NotFound(_)) => Err(AllocationError::MachineNotFound(old.id.clone())),
        Err(e) => Err(e.into()),
    }
}
