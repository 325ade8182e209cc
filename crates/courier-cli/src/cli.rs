use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "courier",
    version,
    about = "Distributes staged directory trees to remote courier peers via ssh tunnels and rsync"
)]
pub(crate) struct Args {
    #[arg(long, default_value = "config/courier.toml")]
    pub(crate) config: PathBuf,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Stage every configured source and push it to all of its destinations
    UpdateAll,
    /// Push one directory to an explicit ssh endpoint, skipping the alias config
    Push {
        /// Local directory to distribute
        #[arg(long)]
        path: PathBuf,
        /// Target address as host:port
        #[arg(long)]
        ssh: String,
        /// Directory to mirror into on the target
        #[arg(long)]
        dest_path: String,
    },
}
