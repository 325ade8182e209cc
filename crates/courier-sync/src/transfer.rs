use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;

use courier_exec::run_capture;

/// Fully resolved rsync invocation for one concrete target. The host and
/// port point at whatever the connection handed back, which for tunneled
/// targets is the loopback bind rather than the real machine.
#[derive(Clone, Debug)]
pub struct RsyncPlan {
    pub local_path: PathBuf,
    pub user: String,
    pub host: String,
    pub port: u16,
    pub key_path: PathBuf,
    pub sudo: bool,
    pub remote_path: String,
}

impl RsyncPlan {
    pub fn target(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.remote_path)
    }

    /// Checksum-based delete-sync: the remote tree ends up an exact mirror
    /// of the local one, stale files removed.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new("rsync");
        cmd.arg("-cvrz")
            .arg("--delete")
            .arg("--exclude=.git*")
            .arg(format!(
                "--rsh=ssh -o StrictHostKeyChecking=no -p {} -i {}",
                self.port,
                self.key_path.display()
            ));
        if self.sudo {
            cmd.arg("--rsync-path=sudo rsync");
        }
        cmd.arg(&self.local_path).arg(self.target());
        cmd
    }
}

/// Outcome of one transfer attempt; kept verbatim so failures stay
/// diagnosable from logs alone.
#[derive(Clone, Debug)]
pub struct PushResult {
    pub target: String,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl PushResult {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[async_trait]
pub trait Transfer: Send + Sync {
    async fn push(&self, plan: &RsyncPlan) -> anyhow::Result<PushResult>;
}

pub struct RsyncTransfer;

#[async_trait]
impl Transfer for RsyncTransfer {
    async fn push(&self, plan: &RsyncPlan) -> anyhow::Result<PushResult> {
        let mut cmd = plan.command();
        let output = run_capture(&mut cmd, None, "rsync").await?;
        Ok(PushResult {
            target: plan.target(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
