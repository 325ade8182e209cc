use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;

/// Per-run working directory under the configured temp root, removed when
/// the guard drops whether the run succeeded or not. The timestamp name
/// keeps concurrent runs apart.
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn create(root: &Path) -> anyhow::Result<Self> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("system clock is before the epoch")?;
        let path = root.join(format!("{}.{:09}", now.as_secs(), now.subsec_nanos()));
        std::fs::create_dir_all(&path)
            .with_context(|| format!("failed to create scratch dir {}", path.display()))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_dir_all(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to remove scratch dir");
        }
    }
}
