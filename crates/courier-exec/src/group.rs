use std::process::Stdio;

use anyhow::Context;
use tokio::process::{Child, Command};

/// Owned handle to a command running detached in its own session, so the
/// whole subtree (ssh and anything it forks) can be signalled at once.
pub struct ProcessGroup {
    label: String,
    pid: u32,
    _child: Child,
    released: bool,
}

/// Spawns `cmd` in its own process group and returns immediately.
pub fn spawn_detached(cmd: &mut Command, label: &str) -> anyhow::Result<ProcessGroup> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    apply_process_group(cmd);
    let child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn {label}"))?;
    let pid = child
        .id()
        .with_context(|| format!("{label} exited before its pid could be read"))?;
    Ok(ProcessGroup {
        label: label.to_string(),
        pid,
        _child: child,
        released: false,
    })
}

impl ProcessGroup {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Sends SIGTERM to the whole group. Failure is logged, never raised:
    /// the group may have already exited on its own. Calling this more
    /// than once is a no-op.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(err) = signal_group(self.pid, termination_signal()) {
            tracing::warn!(
                pid = self.pid,
                error = %err,
                "failed to terminate {}",
                self.label
            );
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(unix)]
fn apply_process_group(cmd: &mut Command) {
    unsafe {
        cmd.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn apply_process_group(_cmd: &mut Command) {}

#[cfg(unix)]
fn termination_signal() -> i32 {
    libc::SIGTERM
}

#[cfg(not(unix))]
fn termination_signal() -> i32 {
    0
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: i32) -> std::io::Result<()> {
    let rc = unsafe { libc::kill(-(pid as i32), signal) };
    if rc == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn signal_group(_pid: u32, _signal: i32) -> std::io::Result<()> {
    Ok(())
}
