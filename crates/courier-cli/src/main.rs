mod cli;
mod config;

use std::io;
use std::path::Path;

use clap::Parser;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use cli::{Args, Command};
use courier_sync::Reconciler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();
    let config = config::load_config(&args.config)?;
    let config_dir = args
        .config
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let reconciler = Reconciler::new(config, config_dir)?;

    let were_errors = match args.command {
        Command::UpdateAll => {
            tracing::info!("updating all sources");
            reconciler.update_all().await
        }
        Command::Push {
            path,
            ssh,
            dest_path,
        } => {
            tracing::info!(path = %path.display(), ssh = %ssh, dest_path = %dest_path, "pushing directory");
            reconciler.push_directory(&path, &ssh, &dest_path).await
        }
    };

    if were_errors {
        tracing::error!("there were errors, check logs for details");
        std::process::exit(1);
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false);
    tracing_subscriber::registry().with(filter).with(layer).init();
}
