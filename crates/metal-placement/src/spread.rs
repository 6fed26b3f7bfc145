//! Rack-spread decision.
//!
//! Prefers racks that hold the fewest machines of the requesting project
//! and, separately, the fewest project machines carrying the requested
//! placement tags. When both preferences agree on some rack, those racks
//! win. When they disagree, the tag preference wins.

use std::collections::BTreeSet;

use metal_core::Machine;
use tracing::debug;

use crate::grouping::GroupedMachines;

/// Elect the racks of `all_racks` with the lowest occupancy in `occupied`.
///
/// Racks missing from `occupied` count as empty. Racks only present in
/// `occupied` are ignored. Ties yield several winners, returned sorted.
pub fn elect_racks(all_racks: &GroupedMachines, occupied: &GroupedMachines) -> Vec<String> {
    let Some(min) = all_racks.keys().map(|rack| occupied.count(rack)).min() else {
        return Vec::new();
    };

    all_racks
        .keys()
        .filter(|rack| occupied.count(rack) == min)
        .map(str::to_string)
        .collect()
}

/// Pick the candidates that balance the project's rack occupancy.
///
/// `available` are the free, live candidates; `project_machines` are the
/// machines the project already holds in the partition. An empty result
/// only happens when `available` is empty.
pub fn spread_across_racks(
    available: &[Machine],
    project_machines: &[Machine],
    tags: &[String],
) -> Vec<Machine> {
    let all_racks = GroupedMachines::by_rack(available);

    let project_racks = GroupedMachines::by_rack(project_machines);
    let least_by_project = elect_racks(&all_racks, &project_racks);

    let tagged = GroupedMachines::by_tags(project_machines)
        .filter(tags)
        .machines();
    let least_by_tags = elect_racks(&all_racks, &GroupedMachines::by_rack(&tagged));

    let project_winners: BTreeSet<&str> = least_by_project.iter().map(String::as_str).collect();
    let both: Vec<&str> = least_by_tags
        .iter()
        .map(String::as_str)
        .filter(|rack| project_winners.contains(rack))
        .collect();

    let preferred = all_racks.filter(&both).machines();
    if !preferred.is_empty() {
        debug!(
            racks = ?both,
            candidates = preferred.len(),
            "project and tag spread agree"
        );
        return preferred;
    }

    let by_tags = all_racks.filter(&least_by_tags).machines();
    debug!(
        racks = ?least_by_tags,
        candidates = by_tags.len(),
        "tag spread overrides project spread"
    );
    by_tags
}
