use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use metal_core::{Ip, Liveliness, Machine, MetalConfig, Network};
use metal_state::StateStore;
use serde::Deserialize;
use tracing::info;

use super::open_store;

/// JSON inventory accepted by `metalctl import`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Inventory {
    pub networks: Vec<Network>,
    pub ips: Vec<Ip>,
    pub machines: Vec<Machine>,
    /// Machine id → liveliness.
    pub liveliness: BTreeMap<String, Liveliness>,
}

pub fn import(config: &MetalConfig, file: &Path) -> anyhow::Result<()> {
    let content =
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let inventory: Inventory = serde_json::from_str(&content)
        .with_context(|| format!("parsing {}", file.display()))?;

    let store = open_store(config)?;
    load(&store, &inventory)?;
    println!(
        "✓ Imported {} networks, {} ips, {} machines",
        inventory.networks.len(),
        inventory.ips.len(),
        inventory.machines.len()
    );
    Ok(())
}

pub fn load(store: &StateStore, inventory: &Inventory) -> anyhow::Result<()> {
    for network in &inventory.networks {
        store.put_network(network)?;
    }
    for ip in &inventory.ips {
        store.put_ip(ip)?;
    }
    for machine in &inventory.machines {
        store
            .create_machine(machine)
            .with_context(|| format!("registering machine {}", machine.id))?;
    }
    for (machine_id, liveliness) in &inventory.liveliness {
        store.put_liveliness(machine_id, *liveliness)?;
    }
    info!(
        networks = inventory.networks.len(),
        ips = inventory.ips.len(),
        machines = inventory.machines.len(),
        "inventory imported"
    );
    Ok(())
}

pub fn list_machines(config: &MetalConfig) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let machines = store.list_machines()?;
    println!("{}", serde_json::to_string_pretty(&machines)?);
    Ok(())
}

pub fn set_liveliness(
    config: &MetalConfig,
    machine_id: &str,
    liveliness: Liveliness,
) -> anyhow::Result<()> {
    let store = open_store(config)?;
    if store.get_machine(machine_id)?.is_none() {
        anyhow::bail!("machine not found: {machine_id}");
    }
    store.put_liveliness(machine_id, liveliness)?;
    println!("✓ {machine_id} is {liveliness:?}");
    Ok(())
}
