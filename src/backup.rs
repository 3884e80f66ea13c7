//! Keep the previous version of a file that is about to be replaced
//!
//! Supports:
//! - backup = true: rename the old file before the new one is moved in
//! - backup_dir: store backups in a specified directory
//! - backup_suffix: backup suffix (default: .zs-old)

use crate::config::Config;
use crate::error::{Error, Result};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// Move an existing `target` out of the way before it is replaced.
///
/// Returns the backup path, or `None` if backups are disabled or there was
/// nothing to back up. A previous backup at the same path is overwritten.
pub fn move_aside(target: &Path, config: &Config) -> Result<Option<PathBuf>> {
    if !config.backup || !target.exists() {
        return Ok(None);
    }

    let backup_path = compute_backup_path(target, config);

    if let Some(parent) = backup_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| Error::io("creating backup directory", e))?;
        }
    }

    match fs::remove_file(&backup_path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(Error::io("removing previous backup", e)),
    }

    fs::rename(target, &backup_path).map_err(|e| {
        Error::io(
            format!("renaming {} to {}", target.display(), backup_path.display()),
            e,
        )
    })?;

    tracing::debug!(
        original = %target.display(),
        backup = %backup_path.display(),
        "Moved previous version aside"
    );

    Ok(Some(backup_path))
}

/// Compute the backup path for a file
pub fn compute_backup_path(path: &Path, config: &Config) -> PathBuf {
    let mut name: OsString = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(&config.backup_suffix);

    match &config.backup_dir {
        // Put backup in the backup directory under the same file name
        Some(backup_dir) => backup_dir.join(name),
        // Put backup alongside original file with suffix
        None => path.with_file_name(name),
    }
}
