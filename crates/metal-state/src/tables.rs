//! redb table definitions for the inventory store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Machines keyed by `{machine_id}`.
pub const MACHINES: TableDefinition<&str, &[u8]> = TableDefinition::new("machines");

/// Networks keyed by `{network_id}`.
pub const NETWORKS: TableDefinition<&str, &[u8]> = TableDefinition::new("networks");

/// IPs keyed by their canonical address text.
pub const IPS: TableDefinition<&str, &[u8]> = TableDefinition::new("ips");

/// Liveliness records keyed by `{machine_id}`.
pub const PROVISIONING_EVENTS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("provisioning_events");
