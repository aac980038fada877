use super::*;
use crate::asset_index::NullAssetIndex;
use crate::ordering::{PathOrderingPolicy, SortKey, SortSpec};
use crate::process::ProcessResult;
use crate::repo::GitRepo;
use crate::settings::SettingsStore;
use crate::test_support::{FakeRunner, failure_result, listing_result, write_bare_repo};
use std::path::PathBuf;
use tempfile::TempDir;

struct Harness {
    engine: SyncEngine,
    runner: Arc<FakeRunner>,
    temp_dir: TempDir,
}

fn test_config() -> EngineConfig {
    EngineConfig {
        process_timeout: Duration::from_secs(5),
        poll_interval: Duration::ZERO,
        path_ordering: PathOrderingPolicy::PosixStyle,
    }
}

fn test_settings(username: &str) -> SettingsStore {
    let mut settings = SettingsStore::in_memory();
    settings.set_username(username).unwrap();
    // A cached program skips the PATH probe, keeping the call log clean.
    settings
        .set_lfs_program(Some(PathBuf::from("git-lfs")))
        .unwrap();
    settings
}

fn start_with(settings: SettingsStore, config: EngineConfig) -> Harness {
    let temp_dir = TempDir::new().unwrap();
    write_bare_repo(temp_dir.path(), "main", true);
    let repo = GitRepo::discover(temp_dir.path()).unwrap().unwrap();

    let runner = Arc::new(FakeRunner::new());
    let engine = SyncEngine::start(
        repo,
        settings,
        runner.clone(),
        Arc::new(NullAssetIndex),
        config,
    )
    .unwrap();
    Harness {
        engine,
        runner,
        temp_dir,
    }
}

fn start() -> Harness {
    start_with(test_settings("jdoe"), test_config())
}

/// Run one scripted refresh so the table has known contents.
fn populate(harness: &Harness, lines: &[&str]) {
    harness.runner.push_response("locks", listing_result(lines));
    harness.engine.refresh_locks();
    harness.engine.wait_idle();
}

#[test]
fn test_lock_inserts_pending_record_then_settles() {
    let harness = start();
    let (gate_tx, gate_rx) = crossbeam_channel::unbounded::<()>();
    harness
        .runner
        .push_gated_response("lock", ProcessResult::default(), gate_rx);
    harness
        .runner
        .push_response("locks", listing_result(&["Assets/a.png\tjdoe\tID:99"]));

    harness.engine.lock("Assets/a.png");

    // The command is still held open, so the optimistic placeholder must be
    // visible already.
    let snapshot = harness.engine.locks();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].path, "Assets/a.png");
    assert_eq!(snapshot[0].holder, "jdoe");
    assert!(snapshot[0].is_pending);
    assert!(snapshot[0].lock_id.is_empty());
    assert!(harness.engine.is_refreshing());

    drop(gate_tx);
    harness.engine.wait_idle();

    let snapshot = harness.engine.locks();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].lock_id, "99");
    assert!(!snapshot[0].is_pending);
    assert!(!harness.engine.is_refreshing());
    assert_eq!(harness.runner.count_calls("lock"), 1);
    assert_eq!(harness.runner.count_calls("locks"), 1);
}

#[test]
fn test_lock_on_already_locked_path_is_noop() {
    let harness = start();
    populate(&harness, &["Assets/a.png\tother\tID:7"]);

    let events = harness.engine.subscribe();
    harness.engine.lock("Assets/a.png");

    assert_eq!(harness.runner.count_calls("lock"), 0);
    assert!(events.try_recv().is_err());
    assert_eq!(harness.engine.locks().len(), 1);
}

#[test]
fn test_refresh_requests_coalesce_into_one_listing() {
    let harness = start();
    let (gate_tx, gate_rx) = crossbeam_channel::unbounded::<()>();
    harness
        .runner
        .push_gated_response("locks", listing_result(&[]), gate_rx);

    harness.engine.refresh_locks();
    harness.engine.refresh_locks();
    harness.engine.refresh_locks();

    drop(gate_tx);
    harness.engine.wait_idle();
    assert_eq!(harness.runner.count_calls("locks"), 1);
}

#[test]
fn test_failed_mutating_command_chains_no_listing() {
    let harness = start();
    harness
        .runner
        .push_response("lock", failure_result("lock failed: not authorized"));

    harness.engine.lock("Assets/a.png");
    harness.engine.wait_idle();

    // No refresh fires, so the placeholder stays pending until a retry or a
    // manual refresh re-derives ground truth.
    assert_eq!(harness.runner.count_calls("locks"), 0);
    let snapshot = harness.engine.locks();
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot[0].is_pending);
}

#[test]
fn test_only_last_mutating_completion_triggers_listing() {
    let harness = start();
    let (gate_a_tx, gate_a_rx) = crossbeam_channel::unbounded::<()>();
    let (gate_b_tx, gate_b_rx) = crossbeam_channel::unbounded::<()>();
    harness
        .runner
        .push_gated_response("lock", ProcessResult::default(), gate_a_rx);
    harness
        .runner
        .push_gated_response("lock", ProcessResult::default(), gate_b_rx);

    harness.engine.lock("Assets/a.png");
    harness.engine.lock("Assets/b.png");
    drop(gate_a_tx);
    drop(gate_b_tx);
    harness.engine.wait_idle();

    assert_eq!(harness.runner.count_calls("lock"), 2);
    assert_eq!(harness.runner.count_calls("locks"), 1);
}

#[test]
fn test_failed_listing_clears_table_and_suspends_polling() {
    let harness = start();
    populate(&harness, &["Assets/a.png\tjdoe\tID:1"]);
    assert_eq!(harness.engine.locks().len(), 1);

    harness
        .runner
        .push_response("locks", failure_result("not authenticated"));
    harness.engine.refresh_locks();
    harness.engine.wait_idle();

    assert!(harness.engine.locks().is_empty());
    assert!(harness.engine.is_auto_refresh_suspended());

    // Background polling stays off while suspended.
    harness.engine.on_timer_tick();
    harness.engine.wait_idle();
    assert_eq!(harness.runner.count_calls("locks"), 2);

    // A manual refresh is still allowed and, once it succeeds, re-arms
    // background polling.
    harness
        .runner
        .push_response("locks", listing_result(&["Assets/a.png\tjdoe\tID:1"]));
    harness.engine.refresh_locks();
    harness.engine.wait_idle();
    assert_eq!(harness.runner.count_calls("locks"), 3);
    assert!(!harness.engine.is_auto_refresh_suspended());
    assert_eq!(harness.engine.locks().len(), 1);

    harness.engine.on_timer_tick();
    harness.engine.wait_idle();
    assert_eq!(harness.runner.count_calls("locks"), 4);
}

#[test]
fn test_force_refresh_clears_then_relists() {
    let harness = start();
    populate(&harness, &["Assets/old.png\tjdoe\tID:1"]);

    let events = harness.engine.subscribe();
    harness
        .runner
        .push_response("locks", listing_result(&["Assets/new.png\tjdoe\tID:2"]));
    harness.engine.force_refresh_locks();

    let snapshot = harness.engine.locks();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].path, "Assets/new.png");
    assert_eq!(harness.runner.count_calls("locks"), 2);

    // One notification for the clear, one for the settled listing.
    assert!(matches!(
        events.recv().unwrap(),
        EngineEvent::LocksRefreshed { .. }
    ));
    assert!(matches!(
        events.recv().unwrap(),
        EngineEvent::LocksRefreshed { .. }
    ));
    assert!(events.try_recv().is_err());
}

#[test]
fn test_force_refresh_discards_outstanding_mutations() {
    let harness = start();
    let (gate_a_tx, gate_a_rx) = crossbeam_channel::unbounded::<()>();
    let (gate_b_tx, gate_b_rx) = crossbeam_channel::unbounded::<()>();
    harness
        .runner
        .push_gated_response("lock", ProcessResult::default(), gate_a_rx);
    harness
        .runner
        .push_gated_response("lock", ProcessResult::default(), gate_b_rx);
    harness.engine.lock("Assets/a.png");
    harness.engine.lock("Assets/b.png");

    // Release the held commands while the hard refresh is draining them.
    let releaser = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        drop(gate_a_tx);
        drop(gate_b_tx);
    });

    harness
        .runner
        .push_response("locks", listing_result(&["Assets/c.png\tjdoe\tID:3"]));
    harness.engine.force_refresh_locks();
    releaser.join().unwrap();

    // The drained completions are discarded: no chained listing fires, and
    // the table holds exactly what the hard refresh's own listing returned.
    assert_eq!(harness.runner.count_calls("locks"), 1);
    let snapshot = harness.engine.locks();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].path, "Assets/c.png");
    harness.engine.wait_idle();
    assert_eq!(harness.runner.count_calls("locks"), 1);
}

#[test]
fn test_unlock_marks_record_pending_once() {
    let harness = start();
    populate(&harness, &["Assets/a.png\tjdoe\tID:7"]);

    let (gate_tx, gate_rx) = crossbeam_channel::unbounded::<()>();
    harness
        .runner
        .push_gated_response("unlock", ProcessResult::default(), gate_rx);

    harness.engine.unlock("7");
    assert!(harness.engine.locks()[0].is_pending);
    assert_eq!(harness.runner.count_calls("unlock"), 1);

    // Already pending: a second unlock must not spawn another command.
    harness.engine.unlock("7");
    assert_eq!(harness.runner.count_calls("unlock"), 1);

    // Unknown id is a no-op too.
    harness.engine.unlock("999");
    assert_eq!(harness.runner.count_calls("unlock"), 1);

    drop(gate_tx);
    harness.engine.wait_idle();
}

#[test]
fn test_force_unlock_passes_force_flag() {
    let harness = start();
    populate(&harness, &["Assets/a.png\tother\tID:7"]);

    harness.engine.force_unlock("7");
    harness.engine.wait_idle();

    assert!(harness
        .runner
        .calls()
        .contains(&vec![
            "unlock".to_string(),
            "--id".to_string(),
            "7".to_string(),
            "--force".to_string()
        ]));
}

#[test]
fn test_sort_locks_reorders_and_persists() {
    let temp_dir = TempDir::new().unwrap();
    let settings_path = temp_dir.path().join("settings.yaml");
    let mut settings = SettingsStore::load(&settings_path).unwrap();
    settings.set_username("jdoe").unwrap();
    settings
        .set_lfs_program(Some(PathBuf::from("git-lfs")))
        .unwrap();
    let harness = start_with(settings, test_config());
    populate(
        &harness,
        &["Assets/b.png\tzed\tID:2", "Assets/a.png\tamy\tID:1"],
    );
    assert_eq!(harness.engine.locks()[0].holder, "amy");

    let spec = SortSpec {
        key: SortKey::Holder,
        ascending: false,
    };
    harness.engine.sort_locks(spec);
    assert_eq!(harness.engine.locks()[0].holder, "zed");
    assert_eq!(harness.engine.sort_spec(), spec);

    harness.engine.stop().unwrap();
    let reloaded = SettingsStore::load(&settings_path).unwrap();
    assert_eq!(reloaded.sort_spec(), spec);
}

#[test]
fn test_timer_tick_respects_poll_interval() {
    let config = EngineConfig {
        poll_interval: Duration::from_secs(3600),
        ..test_config()
    };
    let harness = start_with(test_settings("jdoe"), config);

    harness.engine.on_timer_tick();
    harness.engine.on_timer_tick();
    harness.engine.wait_idle();

    // The first tick polls immediately; the second lands inside the window.
    assert_eq!(harness.runner.count_calls("locks"), 1);
}

#[test]
fn test_listing_drops_malformed_lines_but_keeps_rest() {
    let harness = start();
    let events = harness.engine.subscribe();
    harness.runner.push_response(
        "locks",
        listing_result(&[
            "Assets/a.png\tjdoe\tID:1",
            "this line matches nothing",
            "Assets/b.png\tFoo Bar (fbar@example.com)\tID:2",
        ]),
    );
    harness.engine.refresh_locks();
    harness.engine.wait_idle();

    let snapshot = harness.engine.locks();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[1].holder, "fbar");
    assert!(matches!(
        events.recv().unwrap(),
        EngineEvent::LocksRefreshed { dropped_lines: 1 }
    ));
}

#[test]
fn test_subscriber_sees_status_change_before_refresh() {
    let harness = start();
    let events = harness.engine.subscribe();
    let (gate_tx, gate_rx) = crossbeam_channel::unbounded::<()>();
    harness
        .runner
        .push_gated_response("lock", ProcessResult::default(), gate_rx);

    harness.engine.lock("Assets/a.png");
    match events.recv().unwrap() {
        EngineEvent::LockStatusChanged(record) => {
            assert_eq!(record.path, "Assets/a.png");
            assert!(record.is_pending);
        }
        other => panic!("expected a status change, got {:?}", other),
    }

    drop(gate_tx);
    harness.engine.wait_idle();
    assert!(matches!(
        events.recv().unwrap(),
        EngineEvent::LocksRefreshed { .. }
    ));
}

#[test]
fn test_repo_metadata_reload_on_focus_regain() {
    let harness = start();
    assert_eq!(harness.engine.branch(), "main");

    std::fs::write(
        harness.temp_dir.path().join(".git").join("HEAD"),
        "ref: refs/heads/feature/locks\n",
    )
    .unwrap();

    harness.engine.on_focus_regained();
    assert_eq!(harness.engine.branch(), "feature/locks");
    harness.engine.wait_idle();
    // Regaining focus also kicks a refresh.
    assert_eq!(harness.runner.count_calls("locks"), 1);
}
