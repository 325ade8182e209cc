use std::path::{Path, PathBuf};

use anyhow::Context;

/// Resolves a configured key path against the config directory and locks
/// its permissions down to what ssh will accept.
pub(crate) fn resolve_key_path(key: &Path, config_dir: &Path) -> anyhow::Result<PathBuf> {
    let path = if key.is_absolute() {
        key.to_path_buf()
    } else {
        config_dir.join(key)
    };
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = std::fs::metadata(&path)
            .with_context(|| format!("ssh key {} is not readable", path.display()))?;
        let mut perms = metadata.permissions();
        perms.set_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to restrict permissions on {}", path.display()))?;
    }
    Ok(path)
}
