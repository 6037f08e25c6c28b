//! Point-in-time restoration tests
//!
//! - Plans pick the latest full backup and every incremental up to the target
//! - Restoring to an instant replays the chain in creation order
//! - A chain whose middle incremental is no longer usable is refused
//! - Partial restores, dry-run validation, cancellation and progress
//! - Other store handles wait until a restore has committed

mod common;

use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::{Duration as StdDuration, Instant};

use chrono::Duration;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use common::{stamp, tick, TestEnv};
use trackdb::backup::{BackupError, BackupFilter, BackupOptions, BackupRecord, BackupStatus};
use trackdb::restore::{
    PartialRestoreOptions, ProgressTracker, RestoreError, RestoreManager, RestoreOptions,
};

/// Full backup F, then incrementals I1 and I2 with writes in between.
struct Chain {
    full: BackupRecord,
    first: BackupRecord,
    second: BackupRecord,
}

fn build_chain(env: &TestEnv) -> Chain {
    let backups = env.backups();
    env.seed();
    let full = backups.create_full_backup(&BackupOptions::named("F")).unwrap();

    tick();
    env.add_task("t3", "b1", "Ship parser");
    tick();
    let first = backups
        .create_incremental_backup(&BackupOptions::named("I1").with_parent(&full.id))
        .unwrap();

    tick();
    env.rename_task("t2", "Review parser twice");
    tick();
    let second = backups
        .create_incremental_backup(&BackupOptions::named("I2").with_parent(&first.id))
        .unwrap();

    Chain { full, first, second }
}

// =============================================================================
// Planning
// =============================================================================

#[test]
fn test_plan_stops_at_target() {
    let env = TestEnv::new();
    let chain = build_chain(&env);
    let restores = env.restores();

    let plan = restores.plan(chain.first.created_at).unwrap();
    assert_eq!(plan.backup_ids(), vec![chain.full.id.as_str(), chain.first.id.as_str()]);

    let plan = restores.plan(chain.second.created_at).unwrap();
    assert_eq!(
        plan.backup_ids(),
        vec![
            chain.full.id.as_str(),
            chain.first.id.as_str(),
            chain.second.id.as_str()
        ]
    );

    let plan = restores.plan(chain.full.created_at).unwrap();
    assert_eq!(plan.backup_ids(), vec![chain.full.id.as_str()]);
}

#[test]
fn test_plan_before_any_full_backup() {
    let env = TestEnv::new();
    let restores = env.restores();
    assert!(matches!(
        restores.plan(chrono::Utc::now()),
        Err(RestoreError::NoBaseBackup { .. })
    ));

    let chain = build_chain(&env);
    let err = restores
        .plan(chain.full.created_at - Duration::seconds(1))
        .unwrap_err();
    assert!(matches!(err, RestoreError::NoBaseBackup { .. }));
}

#[test]
fn test_newer_full_backup_becomes_anchor() {
    let env = TestEnv::new();
    let chain = build_chain(&env);
    tick();
    let newer = env.backups().create_full_backup(&BackupOptions::default()).unwrap();

    let plan = env.restores().plan(newer.created_at).unwrap();
    assert_eq!(plan.backup_ids(), vec![newer.id.as_str()]);

    // Older targets still use the older chain
    let plan = env.restores().plan(chain.second.created_at).unwrap();
    assert_eq!(plan.backups.len(), 3);
}

// =============================================================================
// Restoration to an instant
// =============================================================================

#[test]
fn test_restore_to_point_in_time_replays_chain() {
    let env = TestEnv::new();
    let backups = env.backups();
    env.seed();
    let full = backups.create_full_backup(&BackupOptions::default()).unwrap();

    tick();
    env.add_task("t3", "b1", "Ship parser");
    env.add_note("n2", "t3", "needs release notes");
    tick();
    let first = backups
        .create_incremental_backup(&BackupOptions::default().with_parent(&full.id))
        .unwrap();
    let at_first = env.snapshot();

    tick();
    env.rename_task("t1", "Rewrite parser");
    tick();
    let second = backups
        .create_incremental_backup(&BackupOptions::default().with_parent(&first.id))
        .unwrap();
    let at_second = env.snapshot();

    tick();
    env.rename_task("t3", "Edited after every backup");

    let restores = env.restores();
    let report = restores
        .restore_to_point_in_time(first.created_at, &RestoreOptions::default())
        .unwrap();
    assert_eq!(report.applied_backups, vec![full.id.clone(), first.id.clone()]);
    assert_eq!(env.snapshot(), at_first);

    restores
        .restore_to_point_in_time(second.created_at, &RestoreOptions::default())
        .unwrap();
    assert_eq!(env.snapshot(), at_second);
}

#[test]
fn test_sprint_board_scenario() {
    let env = TestEnv::new();
    let backups = env.backups();

    env.add_board("sprint-a", "Sprint A");
    env.add_task("t1", "sprint-a", "Plan sprint");
    env.add_task("t2", "sprint-a", "Run standup");
    let b1 = backups.create_full_backup(&BackupOptions::named("B1")).unwrap();

    tick();
    env.add_task("t3", "sprint-a", "Hold retro");
    env.rename_task("t1", "Plan sprint A");
    tick();
    let b2 = backups
        .create_incremental_backup(&BackupOptions::named("B2").with_parent(&b1.id))
        .unwrap();
    assert_eq!(b2.parent_id.as_deref(), Some(b1.id.as_str()));

    tick();
    env.exec("DELETE FROM boards WHERE id = 'sprint-a'");
    assert_eq!(env.snapshot()["tasks"].len(), 0);

    env.restores()
        .restore_to_point_in_time(b2.created_at, &RestoreOptions::default())
        .unwrap();

    let state = env.snapshot();
    assert_eq!(state["boards"].len(), 1);
    assert_eq!(state["tasks"].len(), 3);
    assert_eq!(env.task_title("t1").as_deref(), Some("Plan sprint A"));
    assert_eq!(env.task_title("t3").as_deref(), Some("Hold retro"));
}

#[test]
fn test_restore_incremental_by_id() {
    let env = TestEnv::new();
    let chain = build_chain(&env);
    let at_second = env.snapshot();

    tick();
    env.rename_task("t1", "Later edit");

    let report = env
        .restores()
        .restore_from_backup(&chain.second.id, &RestoreOptions::default())
        .unwrap();
    assert_eq!(report.applied_backups.len(), 3);
    assert_eq!(env.snapshot(), at_second);
}

#[test]
fn test_corrupted_middle_incremental_blocks_chain() {
    let env = TestEnv::new();
    let chain = build_chain(&env);
    tick();
    env.rename_task("t1", "Current");
    let before = env.snapshot();

    let mut bytes = fs::read(&chain.first.artifact_path).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0xFF;
    fs::write(&chain.first.artifact_path, bytes).unwrap();
    assert!(!env.backups().verify_backup(&chain.first.id));

    let restores = env.restores();
    let err = restores
        .restore_from_backup(&chain.second.id, &RestoreOptions::default())
        .unwrap_err();
    match &err {
        RestoreError::IncompleteBackup { id, status } => {
            assert_eq!(id, &chain.first.id);
            assert_eq!(*status, BackupStatus::Corrupted);
        }
        other => panic!("expected broken chain, got {:?}", other),
    }
    assert!(!err.store_was_touched());

    assert!(matches!(
        restores.restore_to_point_in_time(chain.second.created_at, &RestoreOptions::default()),
        Err(RestoreError::IncompleteBackup { .. })
    ));
    assert!(matches!(
        restores.plan(chain.second.created_at),
        Err(RestoreError::IncompleteBackup { .. })
    ));
    assert_eq!(env.snapshot(), before);

    // The full backup alone is still restorable
    let plan = restores.plan(chain.first.created_at).unwrap();
    assert_eq!(plan.backup_ids(), vec![chain.full.id.as_str()]);
}

#[test]
fn test_failed_backup_cannot_be_restored() {
    let env = TestEnv::new();
    env.seed();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = env
        .backups()
        .create_full_backup(&BackupOptions::default().with_cancel(cancel))
        .unwrap_err();
    assert!(matches!(err, BackupError::Cancelled));

    let failed = env
        .backups()
        .list_backups(&BackupFilter::default().status(BackupStatus::Failed))
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].error_message.is_some());

    let err = env
        .restores()
        .restore_from_backup(&failed[0].id, &RestoreOptions::default())
        .unwrap_err();
    assert!(matches!(err, RestoreError::IncompleteBackup { .. }));
}

// =============================================================================
// Partial restore
// =============================================================================

#[test]
fn test_partial_restore_touches_only_named_tables() {
    let env = TestEnv::new();
    env.seed();
    let full = env.backups().create_full_backup(&BackupOptions::default()).unwrap();
    let tags_at_backup = env.snapshot()["tags"].clone();

    tick();
    env.exec("UPDATE tags SET name = 'blocker' WHERE id = 'g1'");
    env.rename_task("t1", "Kept edit");

    env.restores()
        .restore_partial(&full.id, &PartialRestoreOptions::tables(["tags"]))
        .unwrap();

    assert_eq!(env.snapshot()["tags"], tags_at_backup);
    assert_eq!(env.task_title("t1").as_deref(), Some("Kept edit"));
}

#[test]
fn test_partial_restore_rejects_unknown_tables() {
    let env = TestEnv::new();
    env.seed();
    let full = env.backups().create_full_backup(&BackupOptions::default()).unwrap();
    let before = env.snapshot();

    let err = env
        .restores()
        .restore_partial(&full.id, &PartialRestoreOptions::tables(["tags", "backup_catalog"]))
        .unwrap_err();
    assert!(matches!(err, RestoreError::UnknownTable(ref t) if t == "backup_catalog"));

    let empty: [&str; 0] = [];
    assert!(env
        .restores()
        .restore_partial(&full.id, &PartialRestoreOptions::tables(empty))
        .is_err());
    assert_eq!(env.snapshot(), before);
}

// =============================================================================
// Validation
// =============================================================================

#[test]
fn test_validation_is_a_dry_run() {
    let env = TestEnv::new();
    let chain = build_chain(&env);

    tick();
    env.rename_task("t1", "Not restored");
    let before = env.snapshot();

    let validation = env.restores().validate_restoration(&chain.second.id).unwrap();
    assert!(validation.valid, "{:?}", validation.errors);
    let tasks = validation
        .table_checks
        .iter()
        .find(|c| c.table == "tasks")
        .unwrap();
    assert!(tasks.present);
    assert_eq!(tasks.row_count, 3);

    assert_eq!(env.snapshot(), before);
}

#[test]
fn test_validation_reports_broken_chain() {
    let env = TestEnv::new();
    let chain = build_chain(&env);
    std::fs::write(&chain.first.artifact_path, b"garbage").unwrap();

    let validation = env.restores().validate_restoration(&chain.second.id).unwrap();
    assert!(!validation.valid);
    assert!(!validation.errors.is_empty());

    assert!(matches!(
        env.restores().validate_restoration("missing"),
        Err(RestoreError::NotFound(_))
    ));
}

// =============================================================================
// Cancellation and progress
// =============================================================================

#[test]
fn test_cancelled_restore_leaves_store_unchanged() {
    let env = TestEnv::new();
    let chain = build_chain(&env);
    tick();
    env.rename_task("t1", "Current");
    let before = env.snapshot();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = env
        .restores()
        .restore_from_backup(&chain.second.id, &RestoreOptions::default().with_cancel(cancel))
        .unwrap_err();
    assert!(matches!(err, RestoreError::Cancelled { rolled_back: false }));
    assert!(!err.store_was_touched());
    assert_eq!(env.snapshot(), before);
}

#[test]
fn test_progress_reaches_completion() {
    let env = TestEnv::new();
    let chain = build_chain(&env);
    let tracker = Arc::new(ProgressTracker::new());
    let restores = RestoreManager::new(env.store.clone(), env.config.clone())
        .with_progress(Arc::clone(&tracker));

    let report = restores
        .restore_from_backup(&chain.second.id, &RestoreOptions::default())
        .unwrap();

    let progress = restores.progress(&report.restore_id).unwrap();
    assert!(progress.is_finished());
    assert_eq!(progress.fraction(), 1.0);
    assert_eq!(tracker.get_progress(&report.restore_id), Some(progress));
}

#[test]
fn test_concurrent_writer_waits_for_restore() {
    let env = TestEnv::new();
    let chain = build_chain(&env);
    let at_second = env.snapshot();
    tick();
    env.rename_task("t1", "Overwritten by restore");

    let tracker = Arc::new(ProgressTracker::new());
    let restores = RestoreManager::new(env.store.clone(), env.config.clone())
        .with_progress(Arc::clone(&tracker));

    let store = env.store.clone();
    let seen = Arc::clone(&tracker);
    let writer = thread::spawn(move || {
        let deadline = Instant::now() + StdDuration::from_secs(10);
        while seen.all().is_empty() {
            if Instant::now() > deadline {
                return None;
            }
            thread::yield_now();
        }

        let conn = store.lock().unwrap();
        let committed = seen.all().iter().all(|p| p.is_finished());
        let ts = stamp();
        conn.execute_batch(&format!(
            "INSERT INTO boards (id, name, created_at, updated_at) VALUES ('w1', 'Writer', '{ts}', '{ts}')"
        ))
        .unwrap();
        Some(committed)
    });

    restores
        .restore_from_backup(&chain.second.id, &RestoreOptions::default())
        .unwrap();
    let committed = writer.join().unwrap().expect("restore never reported progress");
    assert!(committed, "writer took the store before the restore committed");

    let state = env.snapshot();
    assert_eq!(state["tasks"], at_second["tasks"]);
    assert_eq!(state["boards"].len(), at_second["boards"].len() + 1);
    assert_eq!(env.task_title("t1").as_deref(), Some("Write parser"));
}
