//! The engine's home thread.
//!
//! All table mutation, notification delivery, and scheduling decisions happen
//! here. Worker threads only run the external command and send the captured
//! result back; they never touch shared state.

use super::{
    Completion, EngineConfig, EngineEvent, OperationKind, PendingOperation, Request, Shared,
};
use crate::asset_index::AssetIndex;
use crate::lfs;
use crate::parse::parse_listing;
use crate::process::{CommandRunner, ProcessResult, render_command};
use crate::repo::GitRepo;
use crate::settings::SettingsStore;
use crate::table::LockRecord;
use chrono::Utc;
use crossbeam_channel::{Receiver, Sender, select, unbounded};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

pub(super) struct RunLoop {
    shared: Shared,
    requests: Receiver<Request>,
    completions_tx: Sender<Completion>,
    completions_rx: Receiver<Completion>,
    repo: GitRepo,
    settings: SettingsStore,
    runner: Arc<dyn CommandRunner>,
    asset_index: Arc<dyn AssetIndex>,
    config: EngineConfig,
    program: Option<PathBuf>,
    subscribers: Vec<Sender<EngineEvent>>,
    operations: HashMap<u64, PendingOperation>,
    next_operation_id: u64,
    mutating_in_flight: usize,
    listing_in_flight: bool,
    last_poll: Option<Instant>,
}

impl RunLoop {
    pub(super) fn new(
        shared: Shared,
        requests: Receiver<Request>,
        repo: GitRepo,
        mut settings: SettingsStore,
        runner: Arc<dyn CommandRunner>,
        asset_index: Arc<dyn AssetIndex>,
        config: EngineConfig,
    ) -> Self {
        let (completions_tx, completions_rx) = unbounded();

        let program = lfs::resolve_lfs_program(runner.as_ref(), settings.lfs_program(), repo.root());
        if program != settings.lfs_program().map(PathBuf::from)
            && let Err(e) = settings.set_lfs_program(program.clone())
        {
            eprintln!("[lockwatch] failed to cache lfs program: {}", e);
        }

        Self {
            shared,
            requests,
            completions_tx,
            completions_rx,
            repo,
            settings,
            runner,
            asset_index,
            config,
            program,
            subscribers: Vec::new(),
            operations: HashMap::new(),
            next_operation_id: 0,
            mutating_in_flight: 0,
            listing_in_flight: false,
            last_poll: None,
        }
    }

    pub(super) fn run(mut self) {
        loop {
            select! {
                recv(self.requests) -> request => match request {
                    Ok(request) => {
                        if !self.handle_request(request) {
                            break;
                        }
                    }
                    // All handles are gone; nobody can observe us anymore.
                    Err(_) => break,
                },
                recv(self.completions_rx) -> completion => {
                    if let Ok(completion) = completion {
                        self.handle_completion(completion);
                    }
                },
            }
        }
        self.settle();
    }

    /// Returns false when the loop should exit.
    fn handle_request(&mut self, request: Request) -> bool {
        match request {
            Request::Lock { path, done } => {
                self.handle_lock(path);
                let _ = done.send(());
            }
            Request::Unlock { id, force, done } => {
                self.handle_unlock(&id, force);
                let _ = done.send(());
            }
            Request::Refresh { done } => {
                self.refresh_unless_outstanding();
                let _ = done.send(());
            }
            Request::ForceRefresh { done } => {
                self.handle_force_refresh();
                let _ = done.send(());
            }
            Request::Sort { spec, done } => {
                self.handle_sort(spec);
                let _ = done.send(());
            }
            Request::TimerTick => self.handle_timer_tick(),
            Request::FocusRegained { done } => {
                self.handle_focus_regained();
                let _ = done.send(());
            }
            Request::WaitIdle { done } => {
                self.settle();
                let _ = done.send(());
            }
            Request::Subscribe { sender } => self.subscribers.push(sender),
            Request::Shutdown => return false,
        }
        true
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::MutatingDone { op_id, result } => {
                self.operations.remove(&op_id);
                self.mutating_in_flight -= 1;
                // Only the last outstanding mutating command refreshes the
                // listing; an intermediate refresh would be immediately
                // stale. A failed command refreshes nothing and leaves its
                // record pending.
                if result.succeeded() && self.mutating_in_flight == 0 && !self.listing_in_flight {
                    self.dispatch_listing();
                }
            }
            Completion::ListingDone { op_id, result } => {
                self.operations.remove(&op_id);
                self.listing_in_flight = false;
                self.apply_listing_result(&result);
            }
        }
        self.publish_refreshing();
    }

    fn handle_lock(&mut self, path: String) {
        {
            let shared = self.shared.lock().expect("engine state poisoned");
            if shared.table.contains_path(&path) {
                return;
            }
        }

        let record = LockRecord::pending(
            path.clone(),
            self.asset_index.path_to_stable_id(&path),
            self.settings.username(),
        );
        {
            let mut shared = self.shared.lock().expect("engine state poisoned");
            shared.table.upsert_pending(record.clone());
            let spec = shared.sort_spec;
            shared.table.sort(spec, self.config.path_ordering);
        }
        self.emit(EngineEvent::LockStatusChanged(record));
        self.dispatch_mutating(lfs::lock_args(&path));
    }

    fn handle_unlock(&mut self, id: &str, force: bool) {
        let updated = {
            let mut shared = self.shared.lock().expect("engine state poisoned");
            let eligible = shared
                .table
                .get_by_id(id)
                .is_some_and(|record| !record.is_pending);
            // Unknown id, or an unlock already in flight for this record.
            if !eligible {
                return;
            }
            shared.table.set_pending_by_id(id)
        };
        if let Some(record) = updated {
            self.emit(EngineEvent::LockStatusChanged(record));
        }
        self.dispatch_mutating(lfs::unlock_args(id, force));
    }

    /// Soft refresh: coalesce into whatever is already outstanding. A
    /// mutating command counts because its continuation chains a listing.
    fn refresh_unless_outstanding(&mut self) {
        if self.listing_in_flight || self.mutating_in_flight > 0 {
            return;
        }
        self.dispatch_listing();
    }

    /// Hard refresh: clear the table now, wait out every in-flight command
    /// (discarding their results), then run one listing synchronously.
    fn handle_force_refresh(&mut self) {
        {
            let mut shared = self.shared.lock().expect("engine state poisoned");
            shared.table.clear();
            shared.is_refreshing = true;
        }
        self.emit(EngineEvent::LocksRefreshed { dropped_lines: 0 });

        self.drain_discarding();

        let op_id = self.register_operation(lfs::locks_args(), OperationKind::Listing);
        let result = self.run_blocking(&lfs::locks_args());
        self.operations.remove(&op_id);
        self.apply_listing_result(&result);
        self.publish_refreshing();
    }

    fn handle_sort(&mut self, spec: crate::ordering::SortSpec) {
        {
            let mut shared = self.shared.lock().expect("engine state poisoned");
            shared.sort_spec = spec;
            shared.table.sort(spec, self.config.path_ordering);
        }
        if let Err(e) = self.settings.set_sort_spec(spec) {
            eprintln!("[lockwatch] failed to persist sort selection: {}", e);
        }
        self.emit(EngineEvent::LocksRefreshed { dropped_lines: 0 });
    }

    fn handle_timer_tick(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last_poll
            && now.duration_since(last) < self.config.poll_interval
        {
            return;
        }
        self.last_poll = Some(now);

        if self.repo.revalidate() {
            self.reload_repo_metadata();
        }

        let suspended = {
            let shared = self.shared.lock().expect("engine state poisoned");
            shared.auto_refresh_suspended
        };
        if !suspended {
            self.refresh_unless_outstanding();
        }
    }

    fn handle_focus_regained(&mut self) {
        if self.repo.revalidate() {
            self.reload_repo_metadata();
        }

        // The tool may have been installed while we were in the background.
        if self.program.is_none() {
            self.program =
                lfs::resolve_lfs_program(self.runner.as_ref(), None, self.repo.root());
            if self.program.is_some()
                && let Err(e) = self.settings.set_lfs_program(self.program.clone())
            {
                eprintln!("[lockwatch] failed to cache lfs program: {}", e);
            }
        }

        let suspended = {
            let shared = self.shared.lock().expect("engine state poisoned");
            shared.auto_refresh_suspended
        };
        if !suspended {
            self.refresh_unless_outstanding();
        }
    }

    fn reload_repo_metadata(&mut self) {
        if let Err(e) = self.repo.reload() {
            eprintln!("[lockwatch] failed to reload repository metadata: {}", e);
            return;
        }
        let mut shared = self.shared.lock().expect("engine state poisoned");
        shared.branch = self.repo.branch().to_string();
        shared.has_lfs = self.repo.has_lfs_configured();
    }

    fn dispatch_mutating(&mut self, args: Vec<String>) {
        self.mutating_in_flight += 1;
        self.dispatch(args, OperationKind::Mutating);
        self.publish_refreshing();
    }

    fn dispatch_listing(&mut self) {
        self.listing_in_flight = true;
        self.dispatch(lfs::locks_args(), OperationKind::Listing);
        self.publish_refreshing();
    }

    fn dispatch(&mut self, args: Vec<String>, kind: OperationKind) {
        let op_id = self.register_operation(args.clone(), kind);
        let completions = self.completions_tx.clone();

        let Some(program) = self.program.clone() else {
            // Resolution failed earlier; report the command as unable to
            // start so scheduling still runs its normal completion path.
            let result = ProcessResult::from_spawn_error("git-lfs executable not found");
            let completion = match kind {
                OperationKind::Mutating => Completion::MutatingDone { op_id, result },
                OperationKind::Listing => Completion::ListingDone { op_id, result },
            };
            let _ = completions.send(completion);
            return;
        };

        let runner = Arc::clone(&self.runner);
        let cwd = self.repo.root().to_path_buf();
        let timeout = self.config.process_timeout;
        std::thread::spawn(move || {
            let result = runner.run(&program, &args, &cwd, timeout);
            let completion = match kind {
                OperationKind::Mutating => Completion::MutatingDone { op_id, result },
                OperationKind::Listing => Completion::ListingDone { op_id, result },
            };
            let _ = completions.send(completion);
        });
    }

    /// Run a command on the home thread, blocking everything else.
    fn run_blocking(&self, args: &[String]) -> ProcessResult {
        match &self.program {
            Some(program) => self.runner.run(
                program,
                args,
                self.repo.root(),
                self.config.process_timeout,
            ),
            None => ProcessResult::from_spawn_error("git-lfs executable not found"),
        }
    }

    fn register_operation(&mut self, args: Vec<String>, kind: OperationKind) -> u64 {
        let op_id = self.next_operation_id;
        self.next_operation_id += 1;
        self.operations.insert(
            op_id,
            PendingOperation {
                args,
                kind,
                started_at: Utc::now(),
            },
        );
        op_id
    }

    /// Rebuild or clear the table from a finished listing.
    fn apply_listing_result(&mut self, result: &ProcessResult) {
        if result.failed() {
            // Stale rows are worse than no rows. Background polling stays
            // off until a manual refresh succeeds, so a broken remote does
            // not spawn a failing process every interval.
            let mut shared = self.shared.lock().expect("engine state poisoned");
            shared.table.clear();
            shared.auto_refresh_suspended = true;
            drop(shared);
            self.emit(EngineEvent::LocksRefreshed { dropped_lines: 0 });
            return;
        }

        let (parsed, dropped_lines) =
            parse_listing(result.out_lines.iter().map(String::as_str));
        if dropped_lines > 0 {
            eprintln!(
                "[lockwatch] dropped {} unparseable listing line(s)",
                dropped_lines
            );
        }
        let records: Vec<LockRecord> = parsed
            .into_iter()
            .map(|lock| LockRecord {
                asset_id: self.asset_index.path_to_stable_id(&lock.path),
                path: lock.path,
                holder: lock.holder,
                lock_id: lock.lock_id,
                is_pending: false,
            })
            .collect();

        let mut shared = self.shared.lock().expect("engine state poisoned");
        shared.table.replace_all(records);
        let spec = shared.sort_spec;
        shared.table.sort(spec, self.config.path_ordering);
        shared.auto_refresh_suspended = false;
        drop(shared);
        self.emit(EngineEvent::LocksRefreshed { dropped_lines });
    }

    /// Process completions until nothing is outstanding. Chained listings
    /// dispatched along the way are waited out too.
    fn settle(&mut self) {
        while self.mutating_in_flight > 0 || self.listing_in_flight {
            match self.completions_rx.recv() {
                Ok(completion) => self.handle_completion(completion),
                Err(_) => break,
            }
        }
    }

    /// Wait out every in-flight command and throw the results away. Used by
    /// the hard refresh, which re-derives everything right after.
    fn drain_discarding(&mut self) {
        // One line per outstanding command; nothing new is dispatched while
        // draining, so the set only shrinks.
        for operation in self.operations.values() {
            eprintln!(
                "[lockwatch] waiting for {} (started {})",
                render_command(std::path::Path::new("git-lfs"), &operation.args),
                operation.started_at.format("%H:%M:%S"),
            );
        }
        while self.mutating_in_flight > 0 || self.listing_in_flight {
            match self.completions_rx.recv() {
                Ok(Completion::MutatingDone { op_id, .. }) => {
                    self.operations.remove(&op_id);
                    self.mutating_in_flight -= 1;
                }
                Ok(Completion::ListingDone { op_id, .. }) => {
                    self.operations.remove(&op_id);
                    self.listing_in_flight = false;
                }
                Err(_) => break,
            }
        }
    }

    fn publish_refreshing(&self) {
        let mut shared = self.shared.lock().expect("engine state poisoned");
        shared.is_refreshing = self.listing_in_flight || self.mutating_in_flight > 0;
    }

    fn emit(&mut self, event: EngineEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}
