use std::path::{Path, PathBuf};

use anyhow::Context;

use courier_protocol::config::{DestinationConfig, DestinationKind};
use courier_protocol::peer::{HermesAddress, ARMADA_SERVICE, HEALTH_PATH};
use courier_protocol::split_host_port;
use courier_remote::{connect_http, connect_ssh, SshLogin, SshTunnelSpec};

use crate::discovery::Discovery;
use crate::keys::resolve_key_path;
use crate::peer::PeerClient;
use crate::transfer::{PushResult, RsyncPlan, Transfer};

/// One concrete machine to rsync to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PushTarget {
    pub ssh_addr: String,
    pub path: String,
}

impl From<HermesAddress> for PushTarget {
    fn from(hermes: HermesAddress) -> Self {
        Self {
            ssh_addr: hermes.ssh,
            path: hermes.path,
        }
    }
}

/// One named push target from configuration. A destination accumulates its
/// own error flag across resolution and every transfer, so a single
/// unreachable node never aborts delivery to the rest.
pub struct Destination {
    config: DestinationConfig,
    config_dir: PathBuf,
    were_errors: bool,
}

impl Destination {
    pub fn new(config: DestinationConfig, config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            config_dir: config_dir.into(),
            were_errors: false,
        }
    }

    pub fn kind(&self) -> DestinationKind {
        self.config.kind
    }

    pub fn were_errors(&self) -> bool {
        self.were_errors
    }

    /// Expands this destination into concrete push targets. Partial
    /// failures (one cluster member unreachable) are logged and flagged
    /// without discarding the members that did resolve; an empty result
    /// with no flag set simply means there is nothing to push to.
    pub async fn resolve_targets(
        &mut self,
        discovery: &dyn Discovery,
        peer: &PeerClient,
    ) -> Vec<PushTarget> {
        match self.config.kind {
            DestinationKind::Ssh => match self.configured_target() {
                Ok(target) => vec![target],
                Err(err) => {
                    tracing::error!(error = %err, "invalid ssh destination");
                    self.were_errors = true;
                    Vec::new()
                }
            },
            DestinationKind::CourierRemote => match self.peer_hermes_address(peer).await {
                Ok(target) => vec![target],
                Err(err) => {
                    tracing::error!(error = format!("{err:#}"), "could not resolve remote courier");
                    self.were_errors = true;
                    Vec::new()
                }
            },
            DestinationKind::ArmadaLocal => {
                let instances = match discovery.healthy_instances(ARMADA_SERVICE).await {
                    Ok(instances) => instances,
                    Err(err) => {
                        tracing::error!(error = format!("{err:#}"), "armada discovery failed");
                        self.were_errors = true;
                        return Vec::new();
                    }
                };
                let mut targets = Vec::new();
                for address in instances {
                    match peer.hermes_address(&address, None).await {
                        Ok(hermes) => targets.push(hermes.into()),
                        Err(err) => {
                            tracing::error!(
                                address = %address,
                                error = format!("{err:#}"),
                                "skipping unreachable armada instance"
                            );
                            self.were_errors = true;
                        }
                    }
                }
                targets
            }
        }
    }

    /// Pushes `local_path` to every resolved target, sequentially in
    /// resolution order. For courier-remote destinations the peer's
    /// /update_all trigger fires after the loop no matter how resolution
    /// went; the peer reconciles from its own configuration either way.
    pub async fn push(
        &mut self,
        local_path: &Path,
        discovery: &dyn Discovery,
        peer: &PeerClient,
        transfer: &dyn Transfer,
    ) {
        let targets = self.resolve_targets(discovery, peer).await;
        self.push_targets(local_path, &targets, transfer).await;
        if self.config.kind == DestinationKind::CourierRemote {
            if let Err(err) = self.trigger_update_all(peer).await {
                tracing::error!(
                    error = format!("{err:#}"),
                    "could not trigger update_all on remote courier"
                );
                self.were_errors = true;
            }
        }
    }

    async fn push_targets(
        &mut self,
        local_path: &Path,
        targets: &[PushTarget],
        transfer: &dyn Transfer,
    ) {
        for target in targets {
            tracing::info!(
                path = %local_path.display(),
                target = %target.ssh_addr,
                remote_path = %target.path,
                "rsyncing"
            );
            match self.push_one(local_path, target, transfer).await {
                Ok(result) if result.succeeded() => {
                    tracing::info!(target = %result.target, "rsync successful");
                }
                Ok(result) => {
                    tracing::error!(
                        target = %result.target,
                        exit_code = ?result.exit_code,
                        stdout = %result.stdout,
                        stderr = %result.stderr,
                        "rsync failed"
                    );
                    self.were_errors = true;
                }
                Err(err) => {
                    tracing::error!(
                        target = %target.ssh_addr,
                        error = format!("{err:#}"),
                        "push failed"
                    );
                    self.were_errors = true;
                }
            }
        }
    }

    async fn push_one(
        &self,
        local_path: &Path,
        target: &PushTarget,
        transfer: &dyn Transfer,
    ) -> anyhow::Result<PushResult> {
        let login = self.login()?;
        let mut conn = connect_ssh(target.ssh_addr.clone(), self.tunnel_spec()?, login.clone());
        let result = async {
            conn.start().await?;
            let addr = conn.local_addr()?;
            let (host, port) = split_host_port(&addr, 22)?;
            let plan = RsyncPlan {
                local_path: local_path.to_path_buf(),
                user: login.user.clone(),
                host,
                port,
                key_path: login.key_path.clone(),
                sudo: self.config.ssh.sudo,
                remote_path: target.path.clone(),
            };
            transfer.push(&plan).await
        }
        .await;
        conn.terminate();
        result
    }

    /// Throwaway health-checked connection to the configured Courier peer,
    /// used only to learn its hermes address; torn down before any
    /// transfer starts.
    async fn peer_hermes_address(&self, peer: &PeerClient) -> anyhow::Result<PushTarget> {
        let address = self.address()?.to_string();
        let mut conn = connect_http(address.clone(), self.tunnel_spec()?, HEALTH_PATH);
        let result = async {
            conn.start().await?;
            let local = conn.local_addr()?;
            peer.hermes_address(&local, Some(&address)).await
        }
        .await;
        conn.terminate();
        Ok(result?.into())
    }

    async fn trigger_update_all(&self, peer: &PeerClient) -> anyhow::Result<()> {
        let address = self.address()?.to_string();
        let mut conn = connect_http(address.clone(), self.tunnel_spec()?, HEALTH_PATH);
        let result = async {
            conn.start().await?;
            let local = conn.local_addr()?;
            tracing::info!(peer = %address, via = %local, "triggering update_all");
            peer.update_all(&local, Some(&address)).await
        }
        .await;
        conn.terminate();
        result
    }

    fn configured_target(&self) -> anyhow::Result<PushTarget> {
        Ok(PushTarget {
            ssh_addr: self.address()?.to_string(),
            path: self
                .config
                .path
                .clone()
                .context("ssh destination has no path")?,
        })
    }

    fn address(&self) -> anyhow::Result<&str> {
        self.config
            .address
            .as_deref()
            .context("destination has no address")
    }

    fn tunnel_spec(&self) -> anyhow::Result<Option<SshTunnelSpec>> {
        let Some(tunnel) = &self.config.ssh_tunnel else {
            return Ok(None);
        };
        let key_path = resolve_key_path(&tunnel.key, &self.config_dir)?;
        Ok(Some(SshTunnelSpec {
            host: tunnel.host.clone(),
            port: tunnel.port,
            user: tunnel.user.clone(),
            key_path,
        }))
    }

    fn login(&self) -> anyhow::Result<SshLogin> {
        let key_path = resolve_key_path(&self.config.ssh.key, &self.config_dir)?;
        Ok(SshLogin {
            user: self.config.ssh.user.clone(),
            key_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use courier_protocol::config::SshAccessConfig;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers one connection per canned response, in order, and returns
    /// the raw requests as received.
    async fn serve_sequence(
        listener: TcpListener,
        responses: Vec<(&'static str, &'static str)>,
    ) -> Vec<String> {
        let mut requests = Vec::new();
        for (status_line, body) in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                if n == 0 || request.windows(4).any(|chunk| chunk == b"\r\n\r\n") {
                    break;
                }
            }
            let response = format!(
                "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            requests.push(String::from_utf8_lossy(&request).into_owned());
        }
        requests
    }

    struct StaticDiscovery(Vec<String>);

    #[async_trait]
    impl Discovery for StaticDiscovery {
        async fn healthy_instances(&self, _service: &str) -> anyhow::Result<Vec<String>> {
            Ok(self.0.clone())
        }
    }

    struct FailingDiscovery;

    #[async_trait]
    impl Discovery for FailingDiscovery {
        async fn healthy_instances(&self, _service: &str) -> anyhow::Result<Vec<String>> {
            anyhow::bail!("agent unreachable")
        }
    }

    struct NoDiscovery;

    #[async_trait]
    impl Discovery for NoDiscovery {
        async fn healthy_instances(&self, _service: &str) -> anyhow::Result<Vec<String>> {
            panic!("discovery must not be consulted for ssh destinations")
        }
    }

    /// Records every plan it sees; fails (exit 23) for hosts listed in
    /// `fail_hosts` and errors outright for hosts in `error_hosts`.
    struct FakeTransfer {
        plans: Mutex<Vec<RsyncPlan>>,
        fail_hosts: Vec<String>,
        error_hosts: Vec<String>,
    }

    impl FakeTransfer {
        fn new() -> Self {
            Self {
                plans: Mutex::new(Vec::new()),
                fail_hosts: Vec::new(),
                error_hosts: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl Transfer for FakeTransfer {
        async fn push(&self, plan: &RsyncPlan) -> anyhow::Result<PushResult> {
            self.plans.lock().unwrap().push(plan.clone());
            if self.error_hosts.contains(&plan.host) {
                anyhow::bail!("simulated connection reset");
            }
            let exit_code = if self.fail_hosts.contains(&plan.host) {
                Some(23)
            } else {
                Some(0)
            };
            Ok(PushResult {
                target: plan.target(),
                exit_code,
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }

    fn ssh_destination(dir: &Path, address: &str, path: &str) -> Destination {
        std::fs::write(dir.join("push.key"), "private").unwrap();
        let config = DestinationConfig {
            kind: DestinationKind::Ssh,
            address: Some(address.to_string()),
            path: Some(path.to_string()),
            ssh: SshAccessConfig {
                user: "docker".to_string(),
                key: PathBuf::from("push.key"),
                sudo: false,
            },
            ssh_tunnel: None,
        };
        Destination::new(config, dir)
    }

    #[tokio::test]
    async fn ssh_kind_resolves_exactly_the_configured_target() {
        let dir = tempfile::tempdir().unwrap();
        let mut dest = ssh_destination(dir.path(), "10.0.0.1:2201", "/srv/hermes");
        let peer = PeerClient::new().unwrap();
        let targets = dest.resolve_targets(&NoDiscovery, &peer).await;
        assert_eq!(
            targets,
            vec![PushTarget {
                ssh_addr: "10.0.0.1:2201".to_string(),
                path: "/srv/hermes".to_string(),
            }]
        );
        assert!(!dest.were_errors());
    }

    fn remote_courier_destination(dir: &Path, address: &str) -> Destination {
        let config = DestinationConfig {
            kind: DestinationKind::CourierRemote,
            address: Some(address.to_string()),
            path: None,
            ssh: SshAccessConfig::default(),
            ssh_tunnel: None,
        };
        Destination::new(config, dir)
    }

    #[tokio::test]
    async fn remote_courier_resolves_its_peer_hermes_address() {
        let dir = tempfile::tempdir().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(serve_sequence(
            listener,
            vec![(
                "HTTP/1.1 200 OK",
                r#"{"ssh": "10.4.0.2:2201", "path": "/tmp/hermes-directory"}"#,
            )],
        ));

        let mut dest = remote_courier_destination(dir.path(), &addr);
        let peer = PeerClient::new().unwrap();
        let targets = dest.resolve_targets(&NoDiscovery, &peer).await;

        assert_eq!(
            targets,
            vec![PushTarget {
                ssh_addr: "10.4.0.2:2201".to_string(),
                path: "/tmp/hermes-directory".to_string(),
            }]
        );
        assert!(!dest.were_errors());
        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("GET /hermes_address"));
        assert!(
            requests[0].to_lowercase().contains(&format!("host: {addr}")),
            "missing host header in: {}",
            requests[0]
        );
    }

    #[tokio::test]
    async fn update_trigger_fires_even_when_resolution_fails() {
        let dir = tempfile::tempdir().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(serve_sequence(
            listener,
            vec![
                ("HTTP/1.1 500 Internal Server Error", "no address for you"),
                ("HTTP/1.1 200 OK", "ok"),
            ],
        ));

        let mut dest = remote_courier_destination(dir.path(), &addr);
        let peer = PeerClient::new().unwrap();
        let transfer = FakeTransfer::new();
        dest.push(Path::new("/tmp/tree"), &NoDiscovery, &peer, &transfer)
            .await;

        assert!(dest.were_errors());
        assert!(transfer.plans.lock().unwrap().is_empty());
        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("GET /hermes_address"));
        assert!(requests[1].starts_with("POST /update_all"));
    }

    #[tokio::test]
    async fn empty_discovery_yields_no_targets_and_no_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = DestinationConfig {
            kind: DestinationKind::ArmadaLocal,
            address: None,
            path: None,
            ssh: SshAccessConfig::default(),
            ssh_tunnel: None,
        };
        let mut dest = Destination::new(config, dir.path());
        let peer = PeerClient::new().unwrap();
        let targets = dest
            .resolve_targets(&StaticDiscovery(Vec::new()), &peer)
            .await;
        assert!(targets.is_empty());
        assert!(!dest.were_errors());
    }

    #[tokio::test]
    async fn discovery_failure_sets_the_error_flag() {
        let dir = tempfile::tempdir().unwrap();
        let config = DestinationConfig {
            kind: DestinationKind::ArmadaLocal,
            address: None,
            path: None,
            ssh: SshAccessConfig::default(),
            ssh_tunnel: None,
        };
        let mut dest = Destination::new(config, dir.path());
        let peer = PeerClient::new().unwrap();
        let targets = dest.resolve_targets(&FailingDiscovery, &peer).await;
        assert!(targets.is_empty());
        assert!(dest.were_errors());
    }

    #[tokio::test]
    async fn one_failing_target_does_not_stop_the_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let mut dest = ssh_destination(dir.path(), "10.0.0.1:22", "/srv/hermes");
        let targets: Vec<PushTarget> = ["10.0.0.1", "10.0.0.2", "10.0.0.3"]
            .iter()
            .map(|host| PushTarget {
                ssh_addr: format!("{host}:22"),
                path: "/srv/hermes".to_string(),
            })
            .collect();
        let transfer = FakeTransfer {
            error_hosts: vec!["10.0.0.2".to_string()],
            ..FakeTransfer::new()
        };
        dest.push_targets(Path::new("/tmp/tree"), &targets, &transfer)
            .await;

        let plans = transfer.plans.lock().unwrap();
        let hosts: Vec<&str> = plans.iter().map(|plan| plan.host.as_str()).collect();
        assert_eq!(hosts, vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
        assert!(dest.were_errors());
    }

    #[tokio::test]
    async fn partial_transfer_flags_errors_but_records_result() {
        let dir = tempfile::tempdir().unwrap();
        let mut dest = ssh_destination(dir.path(), "10.0.0.1:22", "/srv/hermes");
        let targets = vec![
            PushTarget {
                ssh_addr: "10.0.0.1:22".to_string(),
                path: "/srv/hermes".to_string(),
            },
            PushTarget {
                ssh_addr: "10.0.0.2:22".to_string(),
                path: "/srv/hermes".to_string(),
            },
        ];
        let transfer = FakeTransfer {
            fail_hosts: vec!["10.0.0.1".to_string()],
            ..FakeTransfer::new()
        };
        dest.push_targets(Path::new("/tmp/tree"), &targets, &transfer)
            .await;

        let plans = transfer.plans.lock().unwrap();
        assert_eq!(plans.len(), 2);
        assert!(dest.were_errors());
    }

    #[tokio::test]
    async fn push_plan_uses_target_port_and_login() {
        let dir = tempfile::tempdir().unwrap();
        let mut dest = ssh_destination(dir.path(), "10.0.0.9:2222", "/srv/hermes");
        let targets = vec![PushTarget {
            ssh_addr: "10.0.0.9:2222".to_string(),
            path: "/srv/hermes".to_string(),
        }];
        let transfer = FakeTransfer::new();
        dest.push_targets(Path::new("/tmp/tree"), &targets, &transfer)
            .await;

        let plans = transfer.plans.lock().unwrap();
        assert_eq!(plans[0].host, "10.0.0.9");
        assert_eq!(plans[0].port, 2222);
        assert_eq!(plans[0].user, "docker");
        assert_eq!(plans[0].remote_path, "/srv/hermes");
        assert!(!dest.were_errors());
    }
}
