//! LFS executable resolution and command construction.
//!
//! Commands are built as argv vectors (never shell strings), always executed
//! with the repository root as working directory:
//!
//! - `git-lfs locks`
//! - `git-lfs lock <path>`
//! - `git-lfs unlock --id <id> [--force]`
//!
//! The executable path is resolved once and cached in settings. Resolution is
//! not re-attempted automatically when the tool is installed later; a restart
//! (or focus regain, which re-runs resolution when the cache is empty) picks
//! it up.

use crate::process::CommandRunner;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Homebrew install locations probed on non-Windows hosts. ARM and Intel
/// Macs use different prefixes, and the injected PATH from the user's shell
/// profile is not visible to a spawned process.
const HOMEBREW_CANDIDATES: &[&str] = &["/opt/homebrew/bin/git-lfs", "/usr/local/bin/git-lfs"];

/// Timeout for the `version` probe; generous because the probe runs once.
const PROBE_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Arguments for the authoritative listing command.
pub fn locks_args() -> Vec<String> {
    vec!["locks".to_string()]
}

/// Arguments to acquire a lock on `path`.
pub fn lock_args(path: &str) -> Vec<String> {
    vec!["lock".to_string(), path.to_string()]
}

/// Arguments to release the lock with `id`, optionally forcing.
pub fn unlock_args(id: &str, force: bool) -> Vec<String> {
    let mut args = vec!["unlock".to_string(), "--id".to_string(), id.to_string()];
    if force {
        args.push("--force".to_string());
    }
    args
}

/// Resolve the LFS executable, honoring a previously cached path.
///
/// Returns None when no usable executable can be found; the engine then
/// reports every operation as a spawn failure until resolution succeeds.
pub fn resolve_lfs_program(
    runner: &dyn CommandRunner,
    cached: Option<&Path>,
    cwd: &Path,
) -> Option<PathBuf> {
    let candidates = if cfg!(windows) {
        &[][..]
    } else {
        HOMEBREW_CANDIDATES
    };
    resolve_with_candidates(runner, cached, cwd, candidates)
}

fn resolve_with_candidates(
    runner: &dyn CommandRunner,
    cached: Option<&Path>,
    cwd: &Path,
    candidates: &[&str],
) -> Option<PathBuf> {
    if let Some(cached) = cached
        && !cached.as_os_str().is_empty()
    {
        return Some(cached.to_path_buf());
    }

    for candidate in candidates {
        let candidate = Path::new(candidate);
        if candidate.is_file() {
            return Some(candidate.to_path_buf());
        }
    }

    // Fall back to PATH lookup, verified by actually running the tool; on
    // Windows this is the only reliable existence check.
    let program = PathBuf::from("git-lfs");
    if probe(runner, &program, cwd) {
        Some(program)
    } else {
        None
    }
}

/// Check that `program` can be spawned at all by running `version`.
fn probe(runner: &dyn CommandRunner, program: &Path, cwd: &Path) -> bool {
    let result = runner.run(program, &["version".to_string()], cwd, PROBE_TIMEOUT);
    result.spawn_error.is_none()
}
