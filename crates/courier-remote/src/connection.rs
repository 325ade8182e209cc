use std::path::PathBuf;

use tokio::time::sleep;

use courier_exec::{spawn_detached, ProcessGroup};
use courier_protocol::split_host_port;

use crate::error::ConnectError;
use crate::tunnel;

/// How to reach the bastion that fronts a tunneled destination.
#[derive(Clone, Debug)]
pub struct SshTunnelSpec {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub key_path: PathBuf,
}

/// Credentials valid on the push target itself, not on the bastion.
#[derive(Clone, Debug)]
pub struct SshLogin {
    pub user: String,
    pub key_path: PathBuf,
}

#[derive(Clone, Debug)]
pub enum HealthTarget {
    Http { health_path: String },
    Ssh { login: SshLogin },
}

impl HealthTarget {
    /// Port assumed when the remote address carries none.
    fn default_port(&self) -> u16 {
        match self {
            HealthTarget::Http { .. } => 80,
            HealthTarget::Ssh { .. } => 22,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConnectionSpec {
    pub address: String,
    pub tunnel: Option<SshTunnelSpec>,
    pub target: HealthTarget,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Created,
    Starting,
    Healthy,
    Failed,
    Terminated,
}

/// One health-verified channel to a remote address, used for exactly one
/// push attempt. Owns the tunnel process, if any; the owner must call
/// [`RemoteConnection::terminate`] on every exit path, and the process
/// group handle backs that up on drop.
pub struct RemoteConnection {
    spec: ConnectionSpec,
    state: State,
    tunnel: Option<ProcessGroup>,
    bind_port: Option<u16>,
}

/// Connection suitable for HTTP traffic; direct when no tunnel is given.
pub fn connect_http(
    address: impl Into<String>,
    tunnel: Option<SshTunnelSpec>,
    health_path: impl Into<String>,
) -> RemoteConnection {
    RemoteConnection::new(ConnectionSpec {
        address: address.into(),
        tunnel,
        target: HealthTarget::Http {
            health_path: health_path.into(),
        },
    })
}

/// Connection suitable for ssh/rsync traffic; direct when no tunnel is given.
pub fn connect_ssh(
    address: impl Into<String>,
    tunnel: Option<SshTunnelSpec>,
    login: SshLogin,
) -> RemoteConnection {
    RemoteConnection::new(ConnectionSpec {
        address: address.into(),
        tunnel,
        target: HealthTarget::Ssh { login },
    })
}

impl RemoteConnection {
    pub fn new(spec: ConnectionSpec) -> Self {
        Self {
            spec,
            state: State::Created,
            tunnel: None,
            bind_port: None,
        }
    }

    /// Brings the connection up. Direct connections become healthy
    /// immediately; tunneled ones launch the ssh forward on a random
    /// loopback port and verify it end to end before reporting success.
    /// On verification failure the tunnel is released before the error
    /// is returned, so no process outlives a failed start.
    pub async fn start(&mut self) -> Result<(), ConnectError> {
        if self.state != State::Created {
            return Err(ConnectError::NotRestartable {
                address: self.spec.address.clone(),
            });
        }
        let Some(tunnel_spec) = self.spec.tunnel.clone() else {
            self.state = State::Healthy;
            return Ok(());
        };

        let (remote_host, remote_port) =
            split_host_port(&self.spec.address, self.spec.target.default_port()).map_err(
                |err| ConnectError::InvalidAddress {
                    detail: err.to_string(),
                },
            )?;
        let bind_port = tunnel::pick_bind_port();
        let mut cmd = tunnel::tunnel_command(&tunnel_spec, bind_port, &remote_host, remote_port);
        tracing::debug!(
            address = %self.spec.address,
            bastion = %tunnel_spec.host,
            bind_port,
            "starting ssh tunnel"
        );
        let group =
            spawn_detached(&mut cmd, "ssh tunnel").map_err(|err| ConnectError::TunnelSpawn {
                address: self.spec.address.clone(),
                detail: err.to_string(),
            })?;
        self.tunnel = Some(group);
        self.bind_port = Some(bind_port);
        self.state = State::Starting;

        if let Err(err) = self.verify_health(bind_port).await {
            tracing::warn!(address = %self.spec.address, error = %err, "tunnel never became healthy");
            self.release_tunnel();
            self.state = State::Failed;
            return Err(err);
        }
        self.state = State::Healthy;
        Ok(())
    }

    async fn verify_health(&self, bind_port: u16) -> Result<(), ConnectError> {
        for _ in 0..=tunnel::HEALTH_CHECK_RETRIES {
            let healthy = match &self.spec.target {
                HealthTarget::Http { health_path } => {
                    tunnel::http_probe(&self.spec.address, bind_port, health_path).await
                }
                HealthTarget::Ssh { login } => tunnel::ssh_probe(login, bind_port).await,
            };
            if healthy {
                return Ok(());
            }
            sleep(tunnel::SLEEP_BETWEEN_RETRIES).await;
        }
        Err(ConnectError::HealthCheckFailed {
            address: self.spec.address.clone(),
            attempts: tunnel::HEALTH_CHECK_RETRIES + 1,
        })
    }

    /// The address traffic should actually be sent to: the tunnel's local
    /// bind once healthy, or the original address for direct connections.
    pub fn local_addr(&self) -> Result<String, ConnectError> {
        if self.state != State::Healthy {
            return Err(ConnectError::NotInitialized {
                address: self.spec.address.clone(),
            });
        }
        match self.bind_port {
            Some(port) => Ok(format!("{}:{port}", tunnel::LOCAL_BIND_HOST)),
            None => Ok(self.spec.address.clone()),
        }
    }

    /// Idempotent teardown. Never fails: a tunnel that refuses to die is
    /// logged and abandoned. The connection is unusable afterwards.
    pub fn terminate(&mut self) {
        self.release_tunnel();
        if self.state != State::Failed {
            self.state = State::Terminated;
        }
    }

    fn release_tunnel(&mut self) {
        if let Some(mut group) = self.tunnel.take() {
            group.release();
        }
    }
}
