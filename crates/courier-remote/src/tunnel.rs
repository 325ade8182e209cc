use std::ops::Range;

use rand::Rng;
use tokio::process::Command;
use tokio::time::Duration;

use courier_exec::run_capture;

use crate::connection::{SshLogin, SshTunnelSpec};

pub(crate) const LOCAL_BIND_HOST: &str = "127.0.0.1";
/// High ephemeral range; a fresh random port per tunnel keeps concurrent
/// runs from colliding on the loopback bind.
pub(crate) const BIND_PORT_RANGE: Range<u16> = 10000..65535;

pub(crate) const HEALTH_CHECK_RETRIES: u32 = 7;
pub(crate) const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(3);
pub(crate) const SLEEP_BETWEEN_RETRIES: Duration = Duration::from_secs(1);

/// Upper bound on one ssh reachability probe; the ConnectTimeout option
/// only bounds the TCP handshake, not key exchange.
const PROBE_COMMAND_DEADLINE: Duration = Duration::from_secs(10);

pub(crate) fn pick_bind_port() -> u16 {
    rand::thread_rng().gen_range(BIND_PORT_RANGE)
}

pub(crate) fn tunnel_command(
    spec: &SshTunnelSpec,
    bind_port: u16,
    remote_host: &str,
    remote_port: u16,
) -> Command {
    let mut cmd = Command::new("ssh");
    cmd.arg("-i")
        .arg(&spec.key_path)
        .arg("-p")
        .arg(spec.port.to_string())
        .arg(format!("{}@{}", spec.user, spec.host))
        .arg("-N")
        .arg("-o")
        .arg("StrictHostKeyChecking=no")
        .arg("-L")
        .arg(format!(
            "{LOCAL_BIND_HOST}:{bind_port}:{remote_host}:{remote_port}"
        ));
    cmd
}

pub(crate) fn ssh_probe_command(login: &SshLogin, bind_port: u16) -> Command {
    let mut cmd = Command::new("ssh");
    cmd.arg("-o")
        .arg("StrictHostKeyChecking=no")
        .arg("-o")
        .arg(format!(
            "ConnectTimeout={}",
            HEALTH_CHECK_TIMEOUT.as_secs()
        ))
        .arg("-p")
        .arg(bind_port.to_string())
        .arg("-i")
        .arg(&login.key_path)
        .arg(format!("{}@{LOCAL_BIND_HOST}", login.user))
        .arg("true");
    cmd
}

/// One no-op ssh run through the tunnel with the target's own credentials.
pub(crate) async fn ssh_probe(login: &SshLogin, bind_port: u16) -> bool {
    let mut cmd = ssh_probe_command(login, bind_port);
    match run_capture(&mut cmd, Some(PROBE_COMMAND_DEADLINE), "ssh probe").await {
        Ok(output) => output.status.success(),
        Err(err) => {
            tracing::debug!(error = %err, bind_port, "ssh probe failed");
            false
        }
    }
}

/// One HTTP GET against the tunneled loopback endpoint. The destination's
/// original address goes into the Host header so virtual-hosted backends
/// still route the request correctly.
pub(crate) async fn http_probe(host_header: &str, bind_port: u16, health_path: &str) -> bool {
    let client = match reqwest::Client::builder()
        .timeout(HEALTH_CHECK_TIMEOUT)
        .build()
    {
        Ok(client) => client,
        Err(err) => {
            tracing::warn!(error = %err, "failed to build http probe client");
            return false;
        }
    };
    let url = format!("http://{LOCAL_BIND_HOST}:{bind_port}{health_path}");
    match client
        .get(&url)
        .header(reqwest::header::HOST, host_header)
        .send()
        .await
    {
        Ok(response) => response.status() == reqwest::StatusCode::OK,
        Err(err) => {
            tracing::debug!(error = %err, url, "http probe failed");
            false
        }
    }
}

#[cfg(test)]
pub(crate) fn ssh_available() -> bool {
    use std::path::Path;
    Path::new("/usr/bin/ssh").exists() || Path::new("/bin/ssh").exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::path::PathBuf;

    fn args_of(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn bind_ports_stay_in_ephemeral_range() {
        for _ in 0..1000 {
            let port = pick_bind_port();
            assert!((10000..65535).contains(&port), "port {port} out of range");
        }
    }

    #[test]
    fn bind_port_collisions_track_birthday_bound() {
        // 5000 draws over 55535 ports: the birthday estimate is about
        // n^2 / 2m = 225 collisions. Far outside that band means the
        // draw is not uniform over the range.
        let draws = 5000usize;
        let mut seen = HashSet::new();
        let mut collisions = 0usize;
        for _ in 0..draws {
            if !seen.insert(pick_bind_port()) {
                collisions += 1;
            }
        }
        assert!(collisions > 0, "no collisions over {draws} draws");
        assert!(collisions < 500, "{collisions} collisions over {draws} draws");
    }

    #[test]
    fn tunnel_command_forwards_loopback_to_remote() {
        let spec = SshTunnelSpec {
            host: "bastion.example.org".to_string(),
            port: 22,
            user: "tunnel".to_string(),
            key_path: PathBuf::from("/etc/courier/keys/tunnel.key"),
        };
        let cmd = tunnel_command(&spec, 12345, "10.0.0.7", 80);
        assert_eq!(cmd.as_std().get_program(), "ssh");
        let args = args_of(&cmd);
        assert!(args.contains(&"-N".to_string()));
        assert!(args.contains(&"tunnel@bastion.example.org".to_string()));
        assert!(args.contains(&"StrictHostKeyChecking=no".to_string()));
        assert!(args.contains(&"127.0.0.1:12345:10.0.0.7:80".to_string()));
    }

    #[test]
    fn ssh_probe_uses_target_credentials_and_tunnel_port() {
        let login = SshLogin {
            user: "docker".to_string(),
            key_path: PathBuf::from("/etc/courier/keys/docker.key"),
        };
        let cmd = ssh_probe_command(&login, 23456);
        let args = args_of(&cmd);
        assert!(args.contains(&"ConnectTimeout=3".to_string()));
        assert!(args.contains(&"23456".to_string()));
        assert!(args.contains(&"docker@127.0.0.1".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("true"));
    }
}
