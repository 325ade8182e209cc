use std::path::{Path, PathBuf};

use anyhow::Context;

use courier_protocol::config::{SourceConfig, SourceKind};

use crate::scratch::ScratchDir;

/// One configured artifact to distribute. Pulling stages a copy of the
/// tree under a scratch directory so pushes never race with edits to the
/// original, and so the staged tree can be renamed freely.
pub struct Source {
    config: SourceConfig,
}

impl Source {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }

    pub fn destinations(&self) -> &[String] {
        &self.config.destinations
    }

    /// Stages the source tree under `temp_root`. Returns the scratch
    /// guard (dropping it removes the whole staging area) and the path of
    /// the staged copy.
    pub fn pull(&self, temp_root: &Path) -> anyhow::Result<(ScratchDir, PathBuf)> {
        match self.config.kind {
            SourceKind::Directory => {
                anyhow::ensure!(
                    self.config.path.is_dir(),
                    "source directory {} does not exist",
                    self.config.path.display()
                );
                let scratch = ScratchDir::create(temp_root)?;
                let name = self
                    .config
                    .path
                    .file_name()
                    .with_context(|| {
                        format!("source path {} has no name", self.config.path.display())
                    })?;
                let staged = scratch.path().join(name);
                copy_tree(&self.config.path, &staged)?;
                Ok((scratch, staged))
            }
        }
    }

    /// Renames the staged tree so its basename matches the configured
    /// destination path; one rsync destination argument then works
    /// uniformly across every target.
    pub fn align_pushed_path(&self, local_path: &Path) -> anyhow::Result<PathBuf> {
        let pushed = match &self.config.subdirectory {
            Some(sub) => local_path.join(sub.trim_matches('/')),
            None => local_path.to_path_buf(),
        };
        let dest_name = match &self.config.destination_path {
            Some(name) => name.clone(),
            None => local_path
                .file_name()
                .with_context(|| format!("path {} has no name", local_path.display()))?
                .to_string_lossy()
                .into_owned(),
        };
        let parent = pushed
            .parent()
            .with_context(|| format!("path {} has no parent", pushed.display()))?;
        let aligned = parent.join(&dest_name);
        if aligned != pushed {
            tracing::debug!(
                from = %pushed.display(),
                to = %aligned.display(),
                "renaming staged tree"
            );
            std::fs::rename(&pushed, &aligned).with_context(|| {
                format!(
                    "failed to rename {} to {}",
                    pushed.display(),
                    aligned.display()
                )
            })?;
        }
        Ok(aligned)
    }
}

fn copy_tree(from: &Path, to: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(to).with_context(|| format!("failed to create {}", to.display()))?;
    for entry in
        std::fs::read_dir(from).with_context(|| format!("failed to read {}", from.display()))?
    {
        let entry = entry?;
        let target = to.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else if file_type.is_symlink() {
            #[cfg(unix)]
            {
                let link = std::fs::read_link(entry.path())?;
                std::os::unix::fs::symlink(link, &target)
                    .with_context(|| format!("failed to link {}", target.display()))?;
            }
        } else {
            std::fs::copy(entry.path(), &target)
                .with_context(|| format!("failed to copy {}", target.display()))?;
        }
    }
    Ok(())
}
