//! Command implementations for lockwatch.
//!
//! Each command discovers the enclosing repository, spins up a [`SyncEngine`]
//! against the real process runner, performs its operation synchronously, and
//! shuts the engine down. The `watch` command is the only long-running one.

use crate::asset_index::NullAssetIndex;
use crate::cli::{Command, LockArgs, UnlockArgs, UsernameArgs, WatchArgs};
use crate::engine::{EngineConfig, EngineEvent, SyncEngine};
use crate::error::{LockwatchError, Result};
use crate::process::SystemRunner;
use crate::repo::GitRepo;
use crate::settings::SettingsStore;
use crate::table::LockRecord;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Dispatch a command to its implementation.
pub fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Locks => cmd_locks(),
        Command::Lock(args) => cmd_lock(args),
        Command::Unlock(args) => cmd_unlock(args),
        Command::Watch(args) => cmd_watch(args),
        Command::Username(args) => cmd_username(args),
    }
}

/// Find the repository enclosing the current directory.
fn open_repo() -> Result<GitRepo> {
    let cwd = std::env::current_dir()
        .map_err(|e| LockwatchError::User(format!("cannot determine current directory: {}", e)))?;
    GitRepo::discover(&cwd)?
        .ok_or_else(|| LockwatchError::User("not inside a git repository".to_string()))
}

/// Settings live next to the repository's own metadata so they never end up
/// committed.
fn settings_path(repo: &GitRepo) -> PathBuf {
    repo.root().join(".git").join("lockwatch.yaml")
}

fn start_engine(repo: GitRepo, settings: SettingsStore, config: EngineConfig) -> Result<SyncEngine> {
    if !repo.has_lfs_configured() {
        eprintln!(
            "warning: no [lfs] section in .git/config; is LFS set up for this repository?"
        );
    }
    SyncEngine::start(
        repo,
        settings,
        Arc::new(SystemRunner),
        Arc::new(NullAssetIndex),
        config,
    )
}

fn cmd_locks() -> Result<()> {
    let repo = open_repo()?;
    let settings = SettingsStore::load(settings_path(&repo))?;
    let engine = start_engine(repo, settings, EngineConfig::default())?;

    engine.refresh_locks();
    engine.wait_idle();
    if engine.is_auto_refresh_suspended() {
        engine.stop()?;
        return Err(LockwatchError::Protocol(
            "failed to retrieve the lock listing".to_string(),
        ));
    }

    print_table(&engine.locks());
    engine.stop()
}

fn cmd_lock(args: LockArgs) -> Result<()> {
    let repo = open_repo()?;
    let settings = SettingsStore::load(settings_path(&repo))?;
    if !settings.has_username() {
        return Err(LockwatchError::User(
            "no username configured; run `lockwatch username <name>` first".to_string(),
        ));
    }
    let engine = start_engine(repo, settings, EngineConfig::default())?;

    engine.lock(&args.path);
    engine.wait_idle();

    let confirmed = engine
        .locks()
        .iter()
        .find(|record| record.path == args.path && !record.is_pending)
        .cloned();
    engine.stop()?;

    match confirmed {
        Some(record) => {
            println!("Locked '{}' (id {})", record.path, record.lock_id);
            Ok(())
        }
        None => Err(LockwatchError::Protocol(format!(
            "failed to lock '{}'",
            args.path
        ))),
    }
}

fn cmd_unlock(args: UnlockArgs) -> Result<()> {
    let repo = open_repo()?;
    let settings = SettingsStore::load(settings_path(&repo))?;
    let engine = start_engine(repo, settings, EngineConfig::default())?;

    // The engine only unlocks ids it has seen, so derive the table first.
    engine.refresh_locks();
    engine.wait_idle();
    if engine.is_auto_refresh_suspended() {
        engine.stop()?;
        return Err(LockwatchError::Protocol(
            "failed to retrieve the lock listing".to_string(),
        ));
    }
    if !engine.locks().iter().any(|record| record.lock_id == args.id) {
        engine.stop()?;
        return Err(LockwatchError::User(format!(
            "no lock with id '{}'",
            args.id
        )));
    }

    if args.force {
        engine.force_unlock(&args.id);
    } else {
        engine.unlock(&args.id);
    }
    engine.wait_idle();

    let still_listed = engine
        .locks()
        .iter()
        .any(|record| record.lock_id == args.id);
    engine.stop()?;

    if still_listed {
        Err(LockwatchError::Protocol(format!(
            "failed to unlock id '{}'",
            args.id
        )))
    } else {
        println!("Unlocked id '{}'", args.id);
        Ok(())
    }
}

fn cmd_watch(args: WatchArgs) -> Result<()> {
    let repo = open_repo()?;
    let settings = SettingsStore::load(settings_path(&repo))?;
    let config = EngineConfig {
        poll_interval: Duration::from_secs(args.interval.max(1)),
        ..EngineConfig::default()
    };
    let engine = start_engine(repo, settings, config)?;
    let events = engine.subscribe();

    eprintln!(
        "lockwatch watching (branch {}, every {}s)",
        engine.branch(),
        args.interval.max(1)
    );
    engine.refresh_locks();

    loop {
        while let Ok(event) = events.try_recv() {
            match event {
                EngineEvent::LocksRefreshed { dropped_lines } => {
                    if dropped_lines > 0 {
                        eprintln!("warning: dropped {} unparseable listing line(s)", dropped_lines);
                    }
                    print_table(&engine.locks());
                }
                EngineEvent::LockStatusChanged(_) => {}
            }
        }
        std::thread::sleep(Duration::from_secs(1));
        engine.on_timer_tick();
    }
}

fn cmd_username(args: UsernameArgs) -> Result<()> {
    let repo = open_repo()?;
    let mut settings = SettingsStore::load(settings_path(&repo))?;

    match args.name {
        Some(name) => {
            settings.set_username(&name)?;
            println!("Username set to '{}'", name);
            Ok(())
        }
        None if settings.has_username() => {
            println!("{}", settings.username());
            Ok(())
        }
        None => Err(LockwatchError::User(
            "no username configured; run `lockwatch username <name>`".to_string(),
        )),
    }
}

/// Print the lock table as aligned columns.
fn print_table(records: &[LockRecord]) {
    if records.is_empty() {
        println!("No locks.");
        return;
    }

    let path_width = records.iter().map(|r| r.path.len()).max().unwrap_or(0);
    let holder_width = records.iter().map(|r| r.holder.len()).max().unwrap_or(0);
    for record in records {
        let status = if record.is_pending { " (pending)" } else { "" };
        println!(
            "{:<path_width$}  {:<holder_width$}  ID:{}{}",
            record.path, record.holder, record.lock_id, status,
        );
    }
}
