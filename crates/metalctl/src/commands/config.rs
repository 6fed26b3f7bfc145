use std::path::Path;

use metal_core::MetalConfig;

pub fn init(data_dir: &Path, output: &Path) -> anyhow::Result<()> {
    if output.exists() {
        anyhow::bail!("{} already exists", output.display());
    }
    let config = MetalConfig::scaffold(data_dir);
    std::fs::write(output, config.to_toml_string()?)?;
    println!("✓ Generated {}", output.display());
    Ok(())
}
