pub mod allocate;
pub mod config;
pub mod inventory;

use anyhow::Context;
use metal_core::MetalConfig;
use metal_state::StateStore;

/// Open the store named by the config, creating its directory if needed.
pub fn open_store(config: &MetalConfig) -> anyhow::Result<StateStore> {
    let path = &config.store.path;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    StateStore::open(path).with_context(|| format!("opening store {}", path.display()))
}
