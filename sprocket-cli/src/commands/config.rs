//! `sprocket config validate|generate`

use anyhow::{Context, Result};
use sprocket_config::{ConfigLoader, SprocketConfig};
use std::path::Path;
use tracing::info;

/// Load and validate a configuration file
pub fn validate(config_file: &Path) -> Result<()> {
    let config = ConfigLoader::new()
        .from_file(config_file)
        .with_context(|| format!("Invalid configuration in {:?}", config_file))?;

    println!("Configuration is valid");
    println!(
        "  supervisor: {}, task ports: {}..={}",
        config.server.listen_addr(),
        config.execution.first_port(),
        config.execution.last_port()
    );
    if config.execution.restricted {
        println!("  restricted mode: at most {} tasks", config.execution.max_tasks);
    }
    Ok(())
}

/// Write a sample configuration to `output`, or print it
pub fn generate(output: Option<&Path>, force: bool) -> Result<()> {
    let sample = SprocketConfig::generate_sample();

    match output {
        Some(path) => {
            if path.exists() && !force {
                anyhow::bail!("{:?} already exists, use --force to overwrite", path);
            }
            std::fs::write(path, sample).with_context(|| format!("Failed to write {:?}", path))?;
            info!("Sample configuration written to {:?}", path);
            println!("Sample configuration written to {}", path.display());
        }
        None => print!("{}", sample),
    }
    Ok(())
}
