//! Atomic file writes.
//!
//! Every settings save follows the same pattern:
//! 1. Write the content to a temporary file in the target's directory
//! 2. Sync the temporary file to disk (fsync)
//! 3. Rename it over the target
//!
//! On POSIX, `rename()` replaces the destination atomically when source and
//! destination live on the same filesystem. On Windows, `rename()` refuses to
//! replace an existing file, so the target is removed first; the window where
//! neither file exists is accepted because a missing settings file is
//! recreated with defaults on the next load.
//!
//! On crash, a temporary file named `.{filename}.tmp` may remain next to the
//! target; it is overwritten by the next save.

use crate::error::{LockwatchError, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Atomically write bytes to a file.
///
/// The parent directory is created if it does not exist. The target file is
/// never observable in a partially written state.
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            LockwatchError::Settings(format!(
                "failed to create parent directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    let temp_path = temp_path_for(path)?;
    write_and_sync(&temp_path, content)?;
    replace_file(&temp_path, path)
}

/// Atomically write a string to a file.
///
/// Convenience wrapper around [`atomic_write`] for string content.
pub fn atomic_write_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
    atomic_write(path, content.as_bytes())
}

/// Build the sibling temp path `.{filename}.tmp` for a target file.
fn temp_path_for(target: &Path) -> Result<std::path::PathBuf> {
    let parent = target.parent().unwrap_or(Path::new("."));
    let filename = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| LockwatchError::Settings("invalid settings file path".to_string()))?;
    Ok(parent.join(format!(".{}.tmp", filename)))
}

/// Write content to a file and fsync it.
fn write_and_sync(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| {
        LockwatchError::Settings(format!(
            "failed to create temporary file '{}': {}",
            path.display(),
            e
        ))
    })?;

    file.write_all(content)
        .and_then(|()| file.sync_all())
        .map_err(|e| {
            let _ = fs::remove_file(path);
            LockwatchError::Settings(format!(
                "failed to write temporary file '{}': {}",
                path.display(),
                e
            ))
        })
}

#[cfg(unix)]
fn replace_file(source: &Path, target: &Path) -> Result<()> {
    fs::rename(source, target).map_err(|e| {
        let _ = fs::remove_file(source);
        LockwatchError::Settings(format!("failed to replace '{}': {}", target.display(), e))
    })?;

    // Sync the directory entry as well so the rename survives power loss.
    if let Some(parent) = target.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }

    Ok(())
}

#[cfg(windows)]
fn replace_file(source: &Path, target: &Path) -> Result<()> {
    if target.exists() {
        fs::remove_file(target).map_err(|e| {
            let _ = fs::remove_file(source);
            LockwatchError::Settings(format!("failed to replace '{}': {}", target.display(), e))
        })?;
    }
    fs::rename(source, target).map_err(|e| {
        let _ = fs::remove_file(source);
        LockwatchError::Settings(format!("failed to replace '{}': {}", target.display(), e))
    })
}
