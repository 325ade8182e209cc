use std::path::{Path, PathBuf};

use courier_protocol::config::{
    CourierConfig, DestinationConfig, DestinationKind, SourceConfig, SourceKind,
};

use crate::destination::Destination;
use crate::discovery::{Discovery, HttpDiscovery};
use crate::peer::PeerClient;
use crate::source::Source;
use crate::transfer::{RsyncTransfer, Transfer};

/// Drives full reconciliation runs: stage each configured source, push it
/// to every destination it names, and fold all failures into one boolean.
/// Nothing short-circuits; a run reports errors only after every source
/// and destination had its chance.
pub struct Reconciler {
    config: CourierConfig,
    config_dir: PathBuf,
    discovery: Box<dyn Discovery>,
    peer: PeerClient,
    transfer: Box<dyn Transfer>,
}

impl Reconciler {
    pub fn new(config: CourierConfig, config_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let discovery = HttpDiscovery::new(config.discovery.agent_addr.clone())?;
        Ok(Self::with_collaborators(
            config,
            config_dir,
            Box::new(discovery),
            PeerClient::new()?,
            Box::new(RsyncTransfer),
        ))
    }

    pub fn with_collaborators(
        config: CourierConfig,
        config_dir: impl Into<PathBuf>,
        discovery: Box<dyn Discovery>,
        peer: PeerClient,
        transfer: Box<dyn Transfer>,
    ) -> Self {
        Self {
            config,
            config_dir: config_dir.into(),
            discovery,
            peer,
            transfer,
        }
    }

    /// Runs every configured source. Returns true when anything failed.
    pub async fn update_all(&self) -> bool {
        let mut were_errors = false;
        for source_config in &self.config.sources {
            match self.run_source(source_config, None).await {
                Ok(source_errors) => were_errors |= source_errors,
                Err(err) => {
                    tracing::error!(
                        path = %source_config.path.display(),
                        error = format!("{err:#}"),
                        "source update failed"
                    );
                    were_errors = true;
                }
            }
        }
        were_errors
    }

    /// Pushes one directory to an explicit ssh endpoint, bypassing the
    /// configured destination aliases. Returns true when anything failed.
    pub async fn push_directory(&self, path: &Path, ssh_addr: &str, remote_path: &str) -> bool {
        let destination_path = Path::new(remote_path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        let source_config = SourceConfig {
            kind: SourceKind::Directory,
            path: path.to_path_buf(),
            subdirectory: None,
            destination_path,
            destinations: Vec::new(),
        };
        let override_destination = DestinationConfig {
            kind: DestinationKind::Ssh,
            address: Some(ssh_addr.to_string()),
            path: Some(remote_path.to_string()),
            ssh: Default::default(),
            ssh_tunnel: None,
        };
        match self
            .run_source(&source_config, Some(vec![override_destination]))
            .await
        {
            Ok(were_errors) => were_errors,
            Err(err) => {
                tracing::error!(
                    path = %path.display(),
                    error = format!("{err:#}"),
                    "push failed"
                );
                true
            }
        }
    }

    async fn run_source(
        &self,
        config: &SourceConfig,
        overrides: Option<Vec<DestinationConfig>>,
    ) -> anyhow::Result<bool> {
        let source = Source::new(config.clone());
        let (scratch, staged) = source.pull(&self.config.temp_dir)?;
        let pushed = source.align_pushed_path(&staged)?;

        let mut were_errors = false;
        let destination_configs = match overrides {
            Some(configs) => configs,
            None => {
                let mut configs = Vec::new();
                for alias in source.destinations() {
                    match self.config.destinations.get(alias) {
                        Some(entry) => configs.extend(entry.as_slice().iter().cloned()),
                        None => {
                            tracing::error!(alias = %alias, "destination alias is not defined");
                            were_errors = true;
                        }
                    }
                }
                configs
            }
        };

        for destination_config in destination_configs {
            let mut destination = Destination::new(destination_config, &self.config_dir);
            destination
                .push(
                    &pushed,
                    self.discovery.as_ref(),
                    &self.peer,
                    self.transfer.as_ref(),
                )
                .await;
            were_errors |= destination.were_errors();
        }

        drop(scratch);
        Ok(were_errors)
    }
}
