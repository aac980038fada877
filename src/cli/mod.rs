//! CLI argument parsing for lockwatch.
//!
//! Uses clap derive macros for declarative argument definitions. This module
//! defines the command structure; actual implementations are in the
//! `commands` module.

use clap::{Parser, Subcommand};

/// Lockwatch: Git LFS lock synchronization for working copies.
///
/// Talks to the locking service through the `git-lfs` command line tool and
/// keeps a sorted table of outstanding locks, refreshed after every
/// successful mutation.
#[derive(Parser, Debug)]
#[command(name = "lockwatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for lockwatch.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List outstanding locks.
    ///
    /// Runs a listing refresh and prints the lock table in the persisted
    /// sort order.
    Locks,

    /// Acquire a lock on a path.
    ///
    /// Requires a configured username (see `lockwatch username`). The lock
    /// is confirmed against a fresh listing before the command reports
    /// success.
    Lock(LockArgs),

    /// Release a lock by id.
    ///
    /// Use `--force` to release a lock held by another user.
    Unlock(UnlockArgs),

    /// Watch the repository and keep the lock table fresh.
    ///
    /// Polls the listing on an interval and reprints the table whenever it
    /// changes. Runs until interrupted.
    Watch(WatchArgs),

    /// Show or set the lock owner username.
    Username(UsernameArgs),
}

/// Arguments for the `lock` command.
#[derive(Parser, Debug)]
pub struct LockArgs {
    /// Repository-relative path to lock.
    pub path: String,
}

/// Arguments for the `unlock` command.
#[derive(Parser, Debug)]
pub struct UnlockArgs {
    /// Id of the lock to release, as shown by `lockwatch locks`.
    pub id: String,

    /// Release the lock even if another user holds it.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `watch` command.
#[derive(Parser, Debug)]
pub struct WatchArgs {
    /// Seconds between background listing refreshes.
    #[arg(long, default_value_t = 30)]
    pub interval: u64,
}

/// Arguments for the `username` command.
#[derive(Parser, Debug)]
pub struct UsernameArgs {
    /// New username; omit to print the current one.
    pub name: Option<String>,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
