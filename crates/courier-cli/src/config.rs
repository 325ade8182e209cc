use std::path::Path;

use anyhow::Context;

use courier_protocol::config::{CourierConfig, DestinationConfig, DestinationKind};

pub(crate) fn load_config(path: &Path) -> anyhow::Result<CourierConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: CourierConfig = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &CourierConfig) -> anyhow::Result<()> {
    for (alias, entry) in &config.destinations {
        for destination in entry.as_slice() {
            validate_destination(alias, destination)?;
        }
    }
    for source in &config.sources {
        for alias in &source.destinations {
            if !config.destinations.contains_key(alias) {
                anyhow::bail!(
                    "source {} references undefined destination alias {alias}",
                    source.path.display()
                );
            }
        }
    }
    Ok(())
}

fn validate_destination(alias: &str, destination: &DestinationConfig) -> anyhow::Result<()> {
    match destination.kind {
        DestinationKind::Ssh => {
            if destination.address.is_none() {
                anyhow::bail!("ssh destination {alias} must set address");
            }
            if destination.path.is_none() {
                anyhow::bail!("ssh destination {alias} must set path");
            }
        }
        DestinationKind::CourierRemote => {
            if destination.address.is_none() {
                anyhow::bail!("courier-remote destination {alias} must set address");
            }
        }
        // resolves everything through discovery
        DestinationKind::ArmadaLocal => {}
    }
    Ok(())
}
