//! Final accept/reject gate for a reconstructed file

use crate::backup;
use crate::checksum::strong::{digest_file, FileDigest};
use crate::config::Config;
use crate::error::{Error, Phase, Result};
use crate::recipe::Recipe;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Create the temporary output file beside `target`
pub fn create_temp(target: &Path) -> Result<NamedTempFile> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "blockfetch".to_string());

    tempfile::Builder::new()
        .prefix(&format!(".{}.", name))
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(|e| Error::io(format!("creating temporary file in {}", dir.display()), e))
}

/// Flush the temporary file and stamp it with the recipe's modification time
pub fn finish_temp(temp: &mut NamedTempFile, recipe: &Recipe) -> Result<()> {
    temp.flush().map_err(|e| Error::io("flushing temporary file", e))?;
    if let Some(mtime) = recipe.modification_time() {
        temp.as_file()
            .set_modified(mtime)
            .map_err(|e| Error::io("setting modification time", e))?;
    }
    temp.as_file()
        .sync_all()
        .map_err(|e| Error::io("syncing temporary file", e))?;
    Ok(())
}

/// Digest the completed temporary file and compare against the recipe
pub fn verify(temp: &NamedTempFile, recipe: &Recipe) -> Result<FileDigest> {
    let actual = digest_file(temp.path())?;
    if actual != recipe.sha1 {
        return Err(Error::Integrity {
            expected: recipe.sha1_hex(),
            actual: hex::encode(actual),
        });
    }
    Ok(actual)
}

/// Verify `temp` and, if it matches, move it to `target`.
///
/// On a digest mismatch the temporary file is deleted and `target` is left
/// untouched. On success the previous `target` is kept as a backup when
/// configured. Returns the backup path, if one was made.
pub fn verify_and_commit(
    temp: NamedTempFile,
    recipe: &Recipe,
    target: &Path,
    config: &Config,
) -> Result<Option<PathBuf>> {
    if let Err(e) = verify(&temp, recipe) {
        let temp_path = temp.path().to_path_buf();
        if let Err(close_err) = temp.close() {
            tracing::warn!(
                path = %temp_path.display(),
                error = %close_err,
                "Failed to remove temporary file"
            );
        }
        return Err(e.in_phase(Phase::Verify));
    }

    let backup_path = backup::move_aside(target, config).map_err(|e| e.in_phase(Phase::Verify))?;

    if let Err(persist_err) = temp.persist(target) {
        // Put the previous version back so the target is never missing
        if let Some(backup_path) = &backup_path {
            if let Err(restore_err) = std::fs::rename(backup_path, target) {
                tracing::warn!(
                    backup = %backup_path.display(),
                    error = %restore_err,
                    "Failed to restore previous version"
                );
            }
        }
        return Err(Error::io(
            format!("moving reconstructed file to {}", target.display()),
            persist_err.error,
        )
        .in_phase(Phase::Verify));
    }

    tracing::info!(
        target = %target.display(),
        sha1 = %recipe.sha1_hex(),
        "Verified and committed"
    );

    Ok(backup_path)
}
