use std::path::Path;

use anyhow::Context;
use metal_allocator::{AllocationError, AllocationSpec, Allocator, ErrorCategory};
use metal_core::{Machine, MetalConfig, NetworkType};
use serde::Serialize;
use tracing::{info, warn};

use super::open_store;

pub fn allocate(
    config: &MetalConfig,
    project: &str,
    partition: &str,
    size: &str,
    tags: &[String],
) -> anyhow::Result<()> {
    let allocator = Allocator::new(open_store(config)?);
    let machine = claim_with_retry(
        &allocator,
        config.allocation.claim_attempts,
        project,
        partition,
        size,
        tags,
    )?;
    println!("{}", serde_json::to_string_pretty(&machine)?);
    Ok(())
}

/// Re-run selection after lost claim races, up to `attempts` rounds.
pub fn claim_with_retry(
    allocator: &Allocator,
    attempts: u32,
    project: &str,
    partition: &str,
    size: &str,
    tags: &[String],
) -> Result<Machine, AllocationError> {
    let mut rng = rand::rng();
    let mut attempt = 1;
    loop {
        match allocator.select_and_claim(project, partition, size, tags, &mut rng) {
            Ok(machine) => return Ok(machine),
            Err(e) if e.category() == ErrorCategory::Conflict && attempt < attempts => {
                info!(attempt, error = %e, "claim lost, selecting again");
                attempt += 1;
            }
            Err(e) => {
                warn!(attempt, error = %e, "allocation failed");
                return Err(e);
            }
        }
    }
}

#[derive(Serialize)]
struct PlannedNetwork<'a> {
    network_id: &'a str,
    network_type: NetworkType,
    ips: Vec<String>,
    auto: bool,
}

pub fn classify(config: &MetalConfig, file: &Path, partition: &str) -> anyhow::Result<()> {
    let content =
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let spec: AllocationSpec = serde_json::from_str(&content)
        .with_context(|| format!("parsing {}", file.display()))?;

    let allocator = Allocator::new(open_store(config)?);
    let supers = allocator.store().partition_super_networks()?;
    let plan = allocator.validate_and_classify(&spec, partition, &supers)?;

    let planned: Vec<_> = plan
        .iter()
        .map(|(id, n)| PlannedNetwork {
            network_id: id,
            network_type: n.network_type,
            ips: n.ips.iter().map(|ip| ip.address.to_string()).collect(),
            auto: n.auto,
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&planned)?);
    Ok(())
}

pub fn release(config: &MetalConfig, machine_id: &str) -> anyhow::Result<()> {
    let allocator = Allocator::new(open_store(config)?);
    let machine = allocator.release(machine_id)?;
    println!("✓ Released {}", machine.id);
    Ok(())
}
