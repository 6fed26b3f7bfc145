//! Rack and tag groupings of machine sets.
//!
//! Groupings are recomputed per placement decision and never persisted.

use std::collections::{BTreeMap, BTreeSet};

use metal_core::Machine;

/// Machines keyed by a grouping attribute (rack id or tag).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupedMachines(BTreeMap<String, Vec<Machine>>);

impl GroupedMachines {
    /// Group machines by their rack id.
    pub fn by_rack(machines: &[Machine]) -> Self {
        let mut groups: BTreeMap<String, Vec<Machine>> = BTreeMap::new();
        for m in machines {
            groups.entry(m.rack_id.clone()).or_default().push(m.clone());
        }
        Self(groups)
    }

    /// Group machines by tag. A machine with several tags appears in
    /// every one of its groups.
    pub fn by_tags(machines: &[Machine]) -> Self {
        let mut groups: BTreeMap<String, Vec<Machine>> = BTreeMap::new();
        for m in machines {
            for tag in &m.tags {
                groups.entry(tag.clone()).or_default().push(m.clone());
            }
        }
        Self(groups)
    }

    /// Keep only the groups whose key is listed.
    pub fn filter<S: AsRef<str>>(&self, keys: &[S]) -> Self {
        let groups = keys
            .iter()
            .filter_map(|k| {
                self.0
                    .get_key_value(k.as_ref())
                    .map(|(k, v)| (k.clone(), v.clone()))
            })
            .collect();
        Self(groups)
    }

    /// Flatten into a machine set. A machine listed under several keys is
    /// returned once.
    pub fn machines(&self) -> Vec<Machine> {
        let mut seen = BTreeSet::new();
        self.0
            .values()
            .flatten()
            .filter(|m| seen.insert(m.id.clone()))
            .cloned()
            .collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of machines in a group, zero when the group is absent.
    pub fn count(&self, key: &str) -> usize {
        self.0.get(key).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}
