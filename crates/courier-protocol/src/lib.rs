pub mod config;
pub mod peer;

use anyhow::Context;

/// Splits `host:port`, falling back to `default_port` when the address
/// carries no port at all.
pub fn split_host_port(addr: &str, default_port: u16) -> anyhow::Result<(String, u16)> {
    match addr.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .with_context(|| format!("invalid port in address {addr}"))?;
            if host.is_empty() {
                anyhow::bail!("invalid address {addr}, expected host:port");
            }
            Ok((host.to_string(), port))
        }
        None => {
            if addr.is_empty() {
                anyhow::bail!("invalid address, got empty string");
            }
            Ok((addr.to_string(), default_port))
        }
    }
}
