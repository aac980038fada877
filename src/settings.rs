//! Persisted user settings.
//!
//! A flat YAML record (username, cached LFS executable, sort selection, path
//! display preference). Unknown fields are ignored for forward compatibility,
//! and every setter persists synchronously through the atomic write path so
//! the on-disk record always matches what the engine is using.

use crate::error::{LockwatchError, Result};
use crate::fs::atomic_write_file;
use crate::ordering::{SortKey, SortSpec};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

fn default_true() -> bool {
    true
}

/// The on-disk settings record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Lock owner handle used for optimistic placeholder records.
    pub username: String,

    /// Cached path of the LFS executable. Resolved once at startup and on
    /// focus regain; cleared only when probing fails.
    pub lfs_program: Option<PathBuf>,

    /// Primary sort key for the lock table.
    pub sort_key: SortKey,

    /// Sort direction.
    #[serde(default = "default_true")]
    pub sort_ascending: bool,

    /// Whether the host UI shows paths as plain text instead of asset
    /// references. Persisted here; the engine itself never reads it.
    pub show_plain_paths: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            username: String::new(),
            lfs_program: None,
            sort_key: SortKey::default(),
            sort_ascending: true,
            show_plain_paths: false,
        }
    }
}

/// Settings plus the file they persist to.
///
/// Each setter saves synchronously; a failed save surfaces as
/// [`LockwatchError::Settings`] and leaves the in-memory value updated.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    settings: Settings,
}

impl SettingsStore {
    /// Load settings from `path`, falling back to defaults when the file does
    /// not exist yet.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let settings = match fs::read_to_string(&path) {
            Ok(content) => serde_yaml::from_str(&content).map_err(|e| {
                LockwatchError::Settings(format!(
                    "failed to parse settings file '{}': {}",
                    path.display(),
                    e
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Settings::default(),
            Err(e) => {
                return Err(LockwatchError::Settings(format!(
                    "failed to read settings file '{}': {}",
                    path.display(),
                    e
                )));
            }
        };
        Ok(Self { path, settings })
    }

    /// In-memory store for tests and hosts without persistence.
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::new(),
            settings: Settings::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn username(&self) -> &str {
        &self.settings.username
    }

    pub fn has_username(&self) -> bool {
        !self.settings.username.trim().is_empty()
    }

    pub fn set_username(&mut self, username: impl Into<String>) -> Result<()> {
        self.settings.username = username.into();
        self.save()
    }

    pub fn lfs_program(&self) -> Option<&Path> {
        self.settings.lfs_program.as_deref()
    }

    pub fn set_lfs_program(&mut self, program: Option<PathBuf>) -> Result<()> {
        self.settings.lfs_program = program;
        self.save()
    }

    pub fn sort_spec(&self) -> SortSpec {
        SortSpec {
            key: self.settings.sort_key,
            ascending: self.settings.sort_ascending,
        }
    }

    pub fn set_sort_spec(&mut self, spec: SortSpec) -> Result<()> {
        self.settings.sort_key = spec.key;
        self.settings.sort_ascending = spec.ascending;
        self.save()
    }

    pub fn show_plain_paths(&self) -> bool {
        self.settings.show_plain_paths
    }

    pub fn set_show_plain_paths(&mut self, value: bool) -> Result<()> {
        self.settings.show_plain_paths = value;
        self.save()
    }

    /// Persist the current record atomically. A store with no backing path
    /// keeps everything in memory.
    fn save(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }
        let content = serde_yaml::to_string(&self.settings)
            .map_err(|e| LockwatchError::Settings(format!("failed to serialize settings: {}", e)))?;
        atomic_write_file(&self.path, &content)
    }
}
