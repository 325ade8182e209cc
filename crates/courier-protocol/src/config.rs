use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const DEFAULT_TEMP_DIR: &str = "/tmp/courier-temp";
pub const DEFAULT_DISCOVERY_AGENT: &str = "172.17.42.1:8900";

#[derive(Debug, Deserialize)]
pub struct CourierConfig {
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub destinations: BTreeMap<String, DestinationEntry>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_discovery_agent")]
    pub agent_addr: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            agent_addr: default_discovery_agent(),
        }
    }
}

/// One alias may name a single destination or a whole list of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DestinationEntry {
    One(DestinationConfig),
    Many(Vec<DestinationConfig>),
}

impl DestinationEntry {
    pub fn as_slice(&self) -> &[DestinationConfig] {
        match self {
            DestinationEntry::One(config) => std::slice::from_ref(config),
            DestinationEntry::Many(configs) => configs,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DestinationKind {
    Ssh,
    CourierRemote,
    ArmadaLocal,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DestinationConfig {
    #[serde(rename = "type")]
    pub kind: DestinationKind,
    pub address: Option<String>,
    pub path: Option<String>,
    #[serde(default)]
    pub ssh: SshAccessConfig,
    #[serde(rename = "ssh-tunnel")]
    pub ssh_tunnel: Option<SshTunnelConfig>,
}

/// Credentials used on the push target itself; defaults mirror the standard
/// armada deployment where Courier peers expose a dockerized sshd.
#[derive(Clone, Debug, Deserialize)]
pub struct SshAccessConfig {
    #[serde(default = "default_ssh_user")]
    pub user: String,
    #[serde(default = "default_ssh_key")]
    pub key: PathBuf,
    #[serde(default = "default_ssh_sudo")]
    pub sudo: bool,
}

impl Default for SshAccessConfig {
    fn default() -> Self {
        Self {
            user: default_ssh_user(),
            key: default_ssh_key(),
            sudo: default_ssh_sudo(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct SshTunnelConfig {
    pub host: String,
    #[serde(default = "default_tunnel_port")]
    pub port: u16,
    pub user: String,
    pub key: PathBuf,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Directory,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SourceConfig {
    #[serde(rename = "type")]
    pub kind: SourceKind,
    pub path: PathBuf,
    pub subdirectory: Option<String>,
    pub destination_path: Option<String>,
    #[serde(default)]
    pub destinations: Vec<String>,
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from(DEFAULT_TEMP_DIR)
}

fn default_discovery_agent() -> String {
    DEFAULT_DISCOVERY_AGENT.to_string()
}

fn default_ssh_user() -> String {
    "docker".to_string()
}

fn default_ssh_key() -> PathBuf {
    PathBuf::from("keys/docker@armada.key")
}

fn default_ssh_sudo() -> bool {
    true
}

fn default_tunnel_port() -> u16 {
    22
}
