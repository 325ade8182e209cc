use std::process::{Output, Stdio};

use anyhow::Context;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::{timeout, Duration};

/// Runs a command to completion, capturing both output streams fully.
/// With a timeout, the child is killed once the deadline passes and the
/// call fails; without one, the call waits as long as the command does
/// (rsync transfers have no useful upper bound).
pub async fn run_capture(
    cmd: &mut Command,
    deadline: Option<Duration>,
    label: &str,
) -> anyhow::Result<Output> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn {label}"))?;
    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    // Both pipes are drained while waiting; a child emitting more than a
    // pipe buffer must never stall against an un-reading parent.
    let run = async {
        let (status, _, _) = tokio::join!(
            child.wait(),
            async {
                if let Some(pipe) = stdout_pipe.as_mut() {
                    let _ = pipe.read_to_end(&mut stdout).await;
                }
            },
            async {
                if let Some(pipe) = stderr_pipe.as_mut() {
                    let _ = pipe.read_to_end(&mut stderr).await;
                }
            },
        );
        status
    };
    let status = match deadline {
        Some(deadline) => match timeout(deadline, run).await {
            Ok(result) => result.with_context(|| format!("{label} failed"))?,
            Err(_) => {
                let _ = child.kill().await;
                let _ = child.wait().await;
                anyhow::bail!("{label} timed out after {}s", deadline.as_secs())
            }
        },
        None => run.await.with_context(|| format!("{label} failed"))?,
    };
    Ok(Output {
        status,
        stdout,
        stderr,
    })
}
