//! StateStore, the redb-backed inventory persistence.
//!
//! Provides typed access to machines, networks, IPs and liveliness
//! records. All values are JSON-serialized into redb's `&[u8]` value
//! columns. The store supports both on-disk and in-memory backends (the
//! latter for testing).

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use metal_core::{Ip, Liveliness, Machine, Network, ProvisioningEventContainer};

use crate::error::{StateError, StateResult};
use crate::query::MachineSearchQuery;
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Thread-safe inventory store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(MACHINES).map_err(map_err!(Table))?;
        txn.open_table(NETWORKS).map_err(map_err!(Table))?;
        txn.open_table(IPS).map_err(map_err!(Table))?;
        txn.open_table(PROVISIONING_EVENTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic helpers ────────────────────────────────────────────

    fn put<T: Serialize>(&self, table: JsonTable, key: &str, value: &T) -> StateResult<()> {
        let value = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, table: JsonTable, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn list<T: DeserializeOwned>(&self, table: JsonTable) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let item: T = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(item);
        }
        Ok(results)
    }

    fn delete(&self, table: JsonTable, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    // ── Machines ───────────────────────────────────────────────────

    /// Register a machine, or overwrite the registration of an existing one.
    ///
    /// Allocated machines cannot be created. The stored `changed` marker
    /// continues from the previous record so stale copies keep failing.
    pub fn create_machine(&self, machine: &Machine) -> StateResult<Machine> {
        if machine.allocation.is_some() {
            return Err(StateError::Invalid {
                key: machine.id.clone(),
                reason: "a machine cannot be created when it is allocated".to_string(),
            });
        }

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let stored = {
            let mut table = txn.open_table(MACHINES).map_err(map_err!(Table))?;
            let previous = read_machine(&table, &machine.id)?;
            let mut stored = machine.clone();
            stored.changed = previous.map_or(1, |p| p.changed + 1);
            write_machine(&mut table, &stored)?;
            stored
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(machine = %stored.id, changed = stored.changed, "machine registered");
        Ok(stored)
    }

    /// Get a machine by ID.
    pub fn get_machine(&self, machine_id: &str) -> StateResult<Option<Machine>> {
        self.get(MACHINES, machine_id)
    }

    /// List all machines.
    pub fn list_machines(&self) -> StateResult<Vec<Machine>> {
        self.list(MACHINES)
    }

    /// List machines matching every predicate of the query.
    pub fn search_machines(&self, query: &MachineSearchQuery) -> StateResult<Vec<Machine>> {
        let mut machines = self.list_machines()?;
        machines.retain(|m| query.matches(m));
        Ok(machines)
    }

    /// Delete a machine by ID. Returns true if it existed.
    pub fn delete_machine(&self, machine_id: &str) -> StateResult<bool> {
        let existed = self.delete(MACHINES, machine_id)?;
        debug!(machine = %machine_id, existed, "machine deleted");
        Ok(existed)
    }

    /// Replace `old` with `new` if the stored record still carries
    /// `old.changed`.
    ///
    /// Returns the written record with its bumped `changed` marker, or
    /// [`StateError::Conflict`] when somebody else wrote in between.
    pub fn update_machine(&self, old: &Machine, new: &Machine) -> StateResult<Machine> {
        if old.id != new.id {
            return Err(StateError::Invalid {
                key: old.id.clone(),
                reason: format!("cannot replace machine with a record for {}", new.id),
            });
        }

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        match compare_and_replace(&txn, old, new) {
            Ok(updated) => {
                txn.commit().map_err(map_err!(Transaction))?;
                debug!(machine = %updated.id, changed = updated.changed, "machine replaced");
                Ok(updated)
            }
            Err(e) => {
                txn.abort().map_err(map_err!(Transaction))?;
                Err(e)
            }
        }
    }

    // ── Liveliness ─────────────────────────────────────────────────

    /// Insert or update the liveliness record of a machine.
    pub fn put_provisioning_events(&self, ec: &ProvisioningEventContainer) -> StateResult<()> {
        self.put(PROVISIONING_EVENTS, &ec.machine_id, ec)
    }

    /// Record a liveliness observation for a machine at the current time.
    pub fn put_liveliness(&self, machine_id: &str, liveliness: Liveliness) -> StateResult<()> {
        let ec = ProvisioningEventContainer {
            machine_id: machine_id.to_string(),
            liveliness,
            last_event_time: epoch_secs(),
        };
        self.put_provisioning_events(&ec)?;
        debug!(machine = %machine_id, ?liveliness, "liveliness recorded");
        Ok(())
    }

    /// Get the liveliness record of a machine.
    pub fn get_liveliness(
        &self,
        machine_id: &str,
    ) -> StateResult<Option<ProvisioningEventContainer>> {
        self.get(PROVISIONING_EVENTS, machine_id)
    }

    /// All liveliness records keyed by machine ID.
    pub fn list_liveliness(
        &self,
    ) -> StateResult<HashMap<String, ProvisioningEventContainer>> {
        let containers: Vec<ProvisioningEventContainer> = self.list(PROVISIONING_EVENTS)?;
        Ok(containers
            .into_iter()
            .map(|ec| (ec.machine_id.clone(), ec))
            .collect())
    }

    // ── Networks ───────────────────────────────────────────────────

    /// Insert or update a network.
    pub fn put_network(&self, network: &Network) -> StateResult<()> {
        self.put(NETWORKS, &network.id, network)
    }

    /// Get a network by ID.
    pub fn get_network(&self, network_id: &str) -> StateResult<Option<Network>> {
        self.get(NETWORKS, network_id)
    }

    /// List all networks.
    pub fn list_networks(&self) -> StateResult<Vec<Network>> {
        self.list(NETWORKS)
    }

    /// All private super networks, one per partition.
    pub fn partition_super_networks(&self) -> StateResult<Vec<Network>> {
        let mut networks = self.list_networks()?;
        networks.retain(Network::is_private_super);
        Ok(networks)
    }

    // ── IPs ────────────────────────────────────────────────────────

    /// Insert or update an IP.
    pub fn put_ip(&self, ip: &Ip) -> StateResult<()> {
        self.put(IPS, &ip.table_key(), ip)
    }

    /// Get an IP by address.
    pub fn get_ip(&self, address: &IpAddr) -> StateResult<Option<Ip>> {
        self.get(IPS, &address.to_string())
    }

    /// List all IPs of a network.
    pub fn list_ips_for_network(&self, network_id: &str) -> StateResult<Vec<Ip>> {
        let mut ips: Vec<Ip> = self.list(IPS)?;
        ips.retain(|ip| ip.network_id == network_id);
        Ok(ips)
    }
}

fn read_machine(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    machine_id: &str,
) -> StateResult<Option<Machine>> {
    match table.get(machine_id).map_err(map_err!(Read))? {
        Some(guard) => {
            let machine: Machine =
                serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
            Ok(Some(machine))
        }
        None => Ok(None),
    }
}

fn write_machine(
    table: &mut redb::Table<'_, &'static str, &'static [u8]>,
    machine: &Machine,
) -> StateResult<()> {
    let value = serde_json::to_vec(machine).map_err(map_err!(Serialize))?;
    table
        .insert(machine.id.as_str(), value.as_slice())
        .map_err(map_err!(Write))?;
    Ok(())
}

fn compare_and_replace(
    txn: &WriteTransaction,
    old: &Machine,
    new: &Machine,
) -> StateResult<Machine> {
    let mut table = txn.open_table(MACHINES).map_err(map_err!(Table))?;
    let stored = read_machine(&table, &old.id)?
        .ok_or_else(|| StateError::NotFound(format!("machine {}", old.id)))?;

    if stored.changed != old.changed {
        return Err(StateError::Conflict {
            key: old.id.clone(),
            expected: old.changed,
            found: stored.changed,
        });
    }

    let mut updated = new.clone();
    updated.changed = stored.changed + 1;
    write_machine(&mut table, &updated)?;
    Ok(updated)
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
