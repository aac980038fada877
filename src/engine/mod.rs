//! The lock-state synchronization engine.
//!
//! [`SyncEngine`] composes the process runner, parser, lock table, and
//! ordering into the public operations (`lock`, `unlock`, `force_unlock`,
//! `refresh_locks`, `force_refresh_locks`, `sort_locks`) plus the lifecycle
//! hooks the host environment drives (`on_timer_tick`, `on_focus_regained`,
//! `wait_idle`).
//!
//! # Concurrency model
//!
//! A dedicated home thread owns the lock table, the settings store, and all
//! notification delivery. Public operations send requests over a channel and
//! wait for a short acknowledgement, so their observable effects (optimistic
//! pending records, no-op rejection) are applied before the call returns.
//! External commands run on worker threads (any number of mutating commands,
//! but at most one listing command, may be in flight) and their completions
//! marshal back onto the home thread before touching the table. That single
//! marshaling point is what makes the table single-writer without a lock
//! discipline spread across the codebase.
//!
//! # Scheduling rules
//!
//! - A successful mutating command chains a listing refresh, but only the
//!   last outstanding mutating command actually spawns it; an intermediate
//!   listing would be immediately stale.
//! - A failed mutating command chains nothing: its record stays pending until
//!   the user retries or a refresh re-derives ground truth.
//! - Redundant refresh requests coalesce into the in-flight listing.
//! - A failed listing clears the table and suspends background polling until
//!   a manually triggered refresh succeeds again.

mod runloop;

#[cfg(test)]
mod tests;

use crate::asset_index::AssetIndex;
use crate::error::{LockwatchError, Result};
use crate::ordering::{PathOrderingPolicy, SortSpec};
use crate::process::{CommandRunner, DEFAULT_TIMEOUT};
use crate::repo::GitRepo;
use crate::settings::SettingsStore;
use crate::table::{LockRecord, LockTable};
use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Notifications delivered to subscribers, in the order the corresponding
/// table mutations occurred.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// The table was rebuilt (successful refresh), cleared (failed or forced
    /// refresh), or re-sorted. `dropped_lines` counts listing lines that
    /// matched neither accepted shape and were skipped.
    LocksRefreshed { dropped_lines: usize },

    /// A single record flipped to pending because of a local action.
    LockStatusChanged(LockRecord),
}

/// What an in-flight external command is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// `lock` / `unlock`: affects exactly one record.
    Mutating,
    /// `locks`: rebuilds the whole table.
    Listing,
}

/// Bookkeeping for one in-flight external command, created when the command
/// is dispatched and dropped once its completion has been handled on the
/// home thread.
#[derive(Debug, Clone)]
pub struct PendingOperation {
    pub args: Vec<String>,
    pub kind: OperationKind,
    pub started_at: DateTime<Utc>,
}

/// Tunables for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Timeout for a single external command.
    pub process_timeout: Duration,

    /// Minimum interval between background polls; `on_timer_tick` calls
    /// inside the window are ignored.
    pub poll_interval: Duration,

    /// Directory-precedence convention for path sorting.
    pub path_ordering: PathOrderingPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            process_timeout: DEFAULT_TIMEOUT,
            poll_interval: Duration::from_secs(30),
            path_ordering: PathOrderingPolicy::host_default(),
        }
    }
}

/// State readable from any thread; written only by the home thread.
#[derive(Debug, Default)]
pub(crate) struct SharedState {
    pub(crate) table: LockTable,
    pub(crate) sort_spec: SortSpec,
    pub(crate) is_refreshing: bool,
    pub(crate) auto_refresh_suspended: bool,
    pub(crate) branch: String,
    pub(crate) has_lfs: bool,
}

pub(crate) type Shared = Arc<Mutex<SharedState>>;

/// Requests handled on the home thread. Most carry an acknowledgement
/// channel so the caller observes the request's synchronous effects.
pub(crate) enum Request {
    Lock {
        path: String,
        done: Sender<()>,
    },
    Unlock {
        id: String,
        force: bool,
        done: Sender<()>,
    },
    Refresh {
        done: Sender<()>,
    },
    ForceRefresh {
        done: Sender<()>,
    },
    Sort {
        spec: SortSpec,
        done: Sender<()>,
    },
    TimerTick,
    FocusRegained {
        done: Sender<()>,
    },
    WaitIdle {
        done: Sender<()>,
    },
    Subscribe {
        sender: Sender<EngineEvent>,
    },
    Shutdown,
}

/// Worker-thread completions marshaled back onto the home thread.
pub(crate) enum Completion {
    MutatingDone {
        op_id: u64,
        result: crate::process::ProcessResult,
    },
    ListingDone {
        op_id: u64,
        result: crate::process::ProcessResult,
    },
}

/// Handle to a running engine.
///
/// Dropping the handle shuts the engine down: outstanding operations are
/// drained and the home thread is joined, so no child process is orphaned.
pub struct SyncEngine {
    requests: Sender<Request>,
    shared: Shared,
    home: Option<JoinHandle<()>>,
}

impl SyncEngine {
    /// Start the engine against `repo`, with injected collaborators.
    ///
    /// Resolves (and caches) the LFS executable but issues no commands; the
    /// host decides when the first refresh happens.
    pub fn start(
        repo: GitRepo,
        settings: SettingsStore,
        runner: Arc<dyn CommandRunner>,
        asset_index: Arc<dyn AssetIndex>,
        config: EngineConfig,
    ) -> Result<Self> {
        let shared: Shared = Arc::new(Mutex::new(SharedState {
            sort_spec: settings.sort_spec(),
            branch: repo.branch().to_string(),
            has_lfs: repo.has_lfs_configured(),
            ..SharedState::default()
        }));

        let (requests_tx, requests_rx) = unbounded();
        let run_loop = runloop::RunLoop::new(
            Arc::clone(&shared),
            requests_rx,
            repo,
            settings,
            runner,
            asset_index,
            config,
        );
        let home = std::thread::Builder::new()
            .name("lockwatch-engine".to_string())
            .spawn(move || run_loop.run())
            .map_err(|e| LockwatchError::User(format!("failed to start engine thread: {}", e)))?;

        Ok(Self {
            requests: requests_tx,
            shared,
            home: Some(home),
        })
    }

    /// Acquire a lock on `path`.
    ///
    /// No-op when any record (pending or confirmed) already holds the path.
    /// Otherwise a pending placeholder is visible in [`Self::locks`] by the
    /// time this returns, and the `lock` command is in flight.
    pub fn lock(&self, path: impl Into<String>) {
        self.request_and_wait(|done| Request::Lock {
            path: path.into(),
            done,
        });
    }

    /// Release the lock with `id`. No-op for unknown ids and for records
    /// that are already pending.
    pub fn unlock(&self, id: impl Into<String>) {
        self.request_and_wait(|done| Request::Unlock {
            id: id.into(),
            force: false,
            done,
        });
    }

    /// Release another user's lock with `id`.
    pub fn force_unlock(&self, id: impl Into<String>) {
        self.request_and_wait(|done| Request::Unlock {
            id: id.into(),
            force: true,
            done,
        });
    }

    /// Soft refresh: re-derive the table from the `locks` listing. Coalesces
    /// into any refresh already outstanding instead of spawning a second
    /// listing process.
    pub fn refresh_locks(&self) {
        self.request_and_wait(|done| Request::Refresh { done });
    }

    /// Hard refresh: clear the table immediately, drain every outstanding
    /// operation, then run a fresh listing. Blocks until the table settles.
    pub fn force_refresh_locks(&self) {
        self.request_and_wait(|done| Request::ForceRefresh { done });
    }

    /// Change the sort selection, re-sort the table, and persist the choice.
    pub fn sort_locks(&self, spec: SortSpec) {
        self.request_and_wait(|done| Request::Sort { spec, done });
    }

    /// Background polling hook; call at any cadence. Polls at most once per
    /// configured interval, and not at all while a refresh is outstanding or
    /// auto-polling is suspended after a failed listing.
    pub fn on_timer_tick(&self) {
        let _ = self.requests.send(Request::TimerTick);
    }

    /// Focus-regain hook: re-reads repository metadata and kicks a refresh
    /// unless one is outstanding or auto-polling is suspended.
    pub fn on_focus_regained(&self) {
        self.request_and_wait(|done| Request::FocusRegained { done });
    }

    /// Block until no external command is outstanding. Teardown hook for the
    /// host (quit, suspend, reload).
    pub fn wait_idle(&self) {
        self.request_and_wait(|done| Request::WaitIdle { done });
    }

    /// Subscribe to engine notifications. Events arrive in the order the
    /// corresponding mutations occurred.
    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        let (tx, rx) = unbounded();
        let _ = self.requests.send(Request::Subscribe { sender: tx });
        rx
    }

    /// Snapshot of the lock table in current sort order.
    pub fn locks(&self) -> Vec<LockRecord> {
        self.shared.lock().expect("engine state poisoned").table.snapshot()
    }

    /// True while any listing refresh (or a mutating command that will chain
    /// one) is outstanding.
    pub fn is_refreshing(&self) -> bool {
        self.shared.lock().expect("engine state poisoned").is_refreshing
    }

    /// True after a failed listing, until a manual refresh succeeds.
    pub fn is_auto_refresh_suspended(&self) -> bool {
        self.shared
            .lock()
            .expect("engine state poisoned")
            .auto_refresh_suspended
    }

    /// The active sort selection.
    pub fn sort_spec(&self) -> SortSpec {
        self.shared.lock().expect("engine state poisoned").sort_spec
    }

    /// The branch read at startup or the last metadata reload.
    pub fn branch(&self) -> String {
        self.shared.lock().expect("engine state poisoned").branch.clone()
    }

    /// Whether the repository had LFS configured at the last metadata reload.
    pub fn has_lfs_configured(&self) -> bool {
        self.shared.lock().expect("engine state poisoned").has_lfs
    }

    /// Drain outstanding operations and join the home thread.
    pub fn stop(mut self) -> Result<()> {
        if let Some(home) = self.home.take() {
            let _ = self.requests.send(Request::Shutdown);
            home.join()
                .map_err(|_| LockwatchError::User("engine thread panicked".to_string()))?;
        }
        Ok(())
    }

    fn request_and_wait(&self, build: impl FnOnce(Sender<()>) -> Request) {
        let (done_tx, done_rx) = bounded(1);
        if self.requests.send(build(done_tx)).is_ok() {
            // A closed channel means the engine already stopped; there is
            // nothing useful to do with that here.
            let _ = done_rx.recv();
        }
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        if let Some(home) = self.home.take() {
            let _ = self.requests.send(Request::Shutdown);
            let _ = home.join();
        }
    }
}
