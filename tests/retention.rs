//! Retention tests
//!
//! Expired backups are pruned unless a surviving backup still depends on them.

mod common;

use chrono::Duration;
use pretty_assertions::assert_eq;

use common::{tick, TestEnv};
use trackdb::backup::{BackupConfig, BackupFilter, BackupManager, BackupOptions};
use trackdb::store::timestamp::now;

#[test]
fn test_prune_removes_expired_chain() {
    let env = TestEnv::with_config(|c| c.with_retention_days(1));
    env.seed();
    let backups = env.backups();

    let full = backups.create_full_backup(&BackupOptions::default()).unwrap();
    assert!(full.expires_at.is_some());
    tick();
    let inc = backups
        .create_incremental_backup(&BackupOptions::default().with_parent(&full.id))
        .unwrap();

    assert!(backups.prune_expired(now()).unwrap().is_empty());

    let pruned = backups.prune_expired(now() + Duration::days(2)).unwrap();
    assert_eq!(pruned, vec![inc.id.clone(), full.id.clone()]);
    assert!(!full.artifact_path.exists());
    assert!(!inc.artifact_path.exists());
    assert!(backups.list_backups(&BackupFilter::default()).unwrap().is_empty());
}

#[test]
fn test_prune_keeps_parents_of_survivors() {
    let env = TestEnv::with_config(|c| c.with_retention_days(1));
    env.seed();
    let full = env.backups().create_full_backup(&BackupOptions::default()).unwrap();

    // Taken without retention, so it never expires
    tick();
    let config = BackupConfig {
        retention_days: None,
        ..env.config.clone()
    };
    let keeper = BackupManager::new(env.store.clone(), config);
    let inc = keeper
        .create_incremental_backup(&BackupOptions::default().with_parent(&full.id))
        .unwrap();
    assert_eq!(inc.expires_at, None);

    let pruned = env.backups().prune_expired(now() + Duration::days(2)).unwrap();
    assert!(pruned.is_empty());
    assert!(full.artifact_path.exists());
}
