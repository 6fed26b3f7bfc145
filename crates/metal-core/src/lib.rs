//! metal-core: shared domain types for the bare-metal allocation engine.
//!
//! Machines, allocations, networks, IPs and liveliness records are plain
//! serde types so they can be persisted as JSON by `metal-state` and
//! exchanged with the CLI.

pub mod config;
pub mod types;

pub use config::{ConfigError, MetalConfig};
pub use types::*;
