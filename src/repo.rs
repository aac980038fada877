//! Repository introspection.
//!
//! The engine needs three facts about the working copy: where the repository
//! root is, what branch is checked out, and whether LFS is configured. All
//! three are derived by reading repository metadata files directly, without a
//! git subprocess, because they are consulted on every focus regain and timer
//! tick. Failures raise descriptive errors instead of silently defaulting.

use crate::error::{LockwatchError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Cached facts about the repository the engine operates in.
#[derive(Debug, Clone)]
pub struct GitRepo {
    root: PathBuf,
    branch: String,
    has_lfs: bool,
}

impl GitRepo {
    /// Walk up from `start` looking for a `.git` directory. Returns None when
    /// no repository encloses `start`.
    pub fn discover(start: &Path) -> Result<Option<GitRepo>> {
        let mut directory = Some(start.to_path_buf());
        while let Some(dir) = directory {
            if dir.join(".git").is_dir() {
                let mut repo = GitRepo {
                    root: dir,
                    branch: String::new(),
                    has_lfs: false,
                };
                repo.reload()?;
                return Ok(Some(repo));
            }
            directory = dir.parent().map(Path::to_path_buf);
        }
        Ok(None)
    }

    /// Absolute path of the repository root; the working directory for every
    /// LFS invocation.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The currently checked out branch. A detached HEAD yields the raw
    /// commit hash.
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// True when `.git/config` carries an `[lfs]` section.
    pub fn has_lfs_configured(&self) -> bool {
        self.has_lfs
    }

    /// Check that the cached root still is a repository. Returns false when
    /// the directory disappeared (repo deleted or moved under us).
    pub fn revalidate(&self) -> bool {
        self.root.join(".git").is_dir()
    }

    /// Re-read branch and LFS configuration from disk.
    pub fn reload(&mut self) -> Result<()> {
        self.reload_branch()?;
        self.reload_lfs_config()
    }

    /// Re-read the current branch from `.git/HEAD`.
    pub fn reload_branch(&mut self) -> Result<()> {
        let head_path = self.root.join(".git").join("HEAD");
        let content = fs::read_to_string(&head_path).map_err(|e| {
            LockwatchError::Repo(format!(
                "failed to read branch from '{}': {}",
                head_path.display(),
                e
            ))
        })?;
        let first_line = content.lines().next().unwrap_or("").trim();
        self.branch = first_line.replace("ref: refs/heads/", "");
        Ok(())
    }

    /// Re-read `.git/config` to detect LFS configuration.
    pub fn reload_lfs_config(&mut self) -> Result<()> {
        let config_path = self.root.join(".git").join("config");
        let content = fs::read_to_string(&config_path).map_err(|e| {
            LockwatchError::Repo(format!(
                "failed to read git config '{}': {}",
                config_path.display(),
                e
            ))
        })?;
        self.has_lfs = content.contains("[lfs]");
        Ok(())
    }
}
