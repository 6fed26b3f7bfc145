//! Candidate selection.
//!
//! Narrows the inventory to free, available machines of the requested
//! partition and size that are waiting, unclaimed and reported alive.

use metal_core::{Liveliness, Machine};
use metal_state::{MachineSearchQuery, StateStore};
use tracing::{debug, warn};

use crate::error::{AllocationError, AllocationResult};

/// Find every machine eligible for a new allocation.
///
/// Machines without a liveliness record or with a non-alive one are
/// skipped. Read-only.
pub fn find_candidates(
    store: &StateStore,
    partition_id: &str,
    size_id: &str,
) -> AllocationResult<Vec<Machine>> {
    let query = MachineSearchQuery::waiting_candidates(partition_id, size_id);
    let waiting = store.search_machines(&query)?;
    let liveliness = store.list_liveliness()?;

    let mut candidates = Vec::with_capacity(waiting.len());
    for m in waiting {
        match liveliness.get(&m.id) {
            None => {
                warn!(machine = %m.id, "no liveliness record for waiting machine, skipping");
            }
            Some(ec) if ec.liveliness != Liveliness::Alive => {
                debug!(machine = %m.id, liveliness = ?ec.liveliness, "machine not alive, skipping");
            }
            Some(_) => candidates.push(m),
        }
    }

    if candidates.is_empty() {
        warn!(partition = %partition_id, size = %size_id, "no machine available");
        return Err(AllocationError::NoMachineAvailable {
            partition: partition_id.to_string(),
            size: size_id.to_string(),
        });
    }

    debug!(
        partition = %partition_id,
        size = %size_id,
        count = candidates.len(),
        "candidates found"
    );
    Ok(candidates)
}
