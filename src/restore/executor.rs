//! Restoration executor
//!
//! # Sequence
//!
//! 1. Re-read every planned record; each must still be `completed`
//! 2. Optionally take a safety full backup of the current state
//! 3. Optionally verify every planned artifact
//! 4. Load and parse every artifact
//! 5. In one IMMEDIATE transaction with foreign keys off: clear the scoped
//!    tables children first, replay the anchor, replay incrementals in order
//! 6. Check foreign keys, commit
//!
//! Steps 1-4 never touch the managed tables. Any failure in 5-6 drops the
//! transaction, which rolls the whole plan back.

use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::errors::{RestoreError, RestoreResult};
use super::progress::ProgressTracker;
use crate::backup::{
    load_script, verify_record, BackupConfig, BackupError, BackupOptions, BackupRecord,
    BackupWriter, Catalog, Script,
};
use crate::store::timestamp::{self, format_timestamp};
use crate::store::{quote_ident, ManagedTable, StoreError};

/// Options for a restoration.
#[derive(Debug, Clone)]
pub struct RestoreOptions {
    /// Take a full backup of the current state before touching anything
    pub preserve_existing: bool,
    /// Verify every planned artifact first
    pub verify: bool,
    pub cancel: CancellationToken,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            preserve_existing: false,
            verify: true,
            cancel: CancellationToken::new(),
        }
    }
}

impl RestoreOptions {
    pub fn preserving(mut self) -> Self {
        self.preserve_existing = true;
        self
    }

    pub fn without_verification(mut self) -> Self {
        self.verify = false;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Outcome of a committed restoration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub restore_id: String,
    /// Full backup taken before the restore when `preserve_existing` was set
    pub safety_backup_id: Option<String>,
    /// Applied backup ids in application order
    pub applied_backups: Vec<String>,
    pub statements_applied: usize,
}

/// Tables a restoration replaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreScope {
    All,
    Tables(Vec<ManagedTable>),
}

impl RestoreScope {
    /// Scoped tables in dependency order.
    pub fn tables(&self) -> Vec<ManagedTable> {
        match self {
            RestoreScope::All => ManagedTable::ALL.to_vec(),
            RestoreScope::Tables(tables) => ManagedTable::ALL
                .into_iter()
                .filter(|t| tables.contains(t))
                .collect(),
        }
    }

    /// Whether statements of the script section `table` are replayed.
    fn includes(&self, table: &str) -> bool {
        match self {
            RestoreScope::All => true,
            RestoreScope::Tables(tables) => tables.iter().any(|t| t.name() == table),
        }
    }

    fn is_all(&self) -> bool {
        matches!(self, RestoreScope::All)
    }
}

/// Run a restoration of `planned` (anchor first) on a locked connection.
pub(crate) fn execute_locked(
    conn: &Connection,
    config: &BackupConfig,
    progress: Option<&ProgressTracker>,
    planned: &[BackupRecord],
    scope: &RestoreScope,
    opts: &RestoreOptions,
) -> RestoreResult<RestoreReport> {
    let restore_id = Uuid::new_v4().to_string();
    let total_steps = planned.len() + 3;
    let report = |step: usize, message: &str| {
        if let Some(tracker) = progress {
            tracker.report_progress(&restore_id, total_steps, step, message);
        }
    };

    let records = refresh_records(conn, planned)?;
    match records.first() {
        Some(anchor) if anchor.is_full() => {}
        _ => {
            return Err(RestoreError::NoBaseBackup {
                target: planned
                    .last()
                    .map(|r| format_timestamp(r.created_at))
                    .unwrap_or_default(),
            })
        }
    }
    tracing::info!(
        restore_id = %restore_id,
        backups = records.len(),
        anchor = %records[0].id,
        "restore started"
    );
    report(0, "starting");

    check_cancelled(&opts.cancel, false)?;
    let safety_backup_id = if opts.preserve_existing {
        let safety = BackupWriter::new(conn, config)
            .create(
                crate::backup::BackupKind::Full,
                &BackupOptions::named(format!("pre-restore-{}", restore_id))
                    .with_description("state before restore")
                    .with_cancel(opts.cancel.clone()),
            )
            .map_err(|e| match e {
                BackupError::Cancelled => RestoreError::Cancelled { rolled_back: false },
                other => other.into(),
            })?;
        tracing::info!(restore_id = %restore_id, backup_id = %safety.id, "preserved current state");
        Some(safety.id)
    } else {
        None
    };
    report(1, "current state preserved");

    let applied = (|| -> RestoreResult<usize> {
        check_cancelled(&opts.cancel, false)?;
        if opts.verify {
            verify_plan(conn, &records)?;
        }
        let loaded = load_plan(&records)?;
        report(2, "plan verified");

        let mut on_applied = |index: usize, backup_id: &str| {
            report(3 + index, &format!("applied backup {}", backup_id));
        };
        apply_plan(conn, &loaded, scope, &opts.cancel, &mut on_applied)
    })();

    let statements_applied = match (applied, &safety_backup_id) {
        (Ok(count), _) => count,
        (Err(e), Some(safety_id)) => {
            tracing::warn!(
                restore_id = %restore_id,
                safety_backup_id = %safety_id,
                error = %e,
                "restore failed, current state kept in safety backup"
            );
            return Err(RestoreError::Preserved {
                safety_backup_id: safety_id.clone(),
                source: Box::new(e),
            });
        }
        (Err(e), None) => return Err(e),
    };
    report(total_steps, "restore committed");

    tracing::info!(
        restore_id = %restore_id,
        statements = statements_applied,
        "restore committed"
    );

    Ok(RestoreReport {
        restore_id: restore_id.clone(),
        safety_backup_id,
        applied_backups: records.iter().map(|r| r.id.clone()).collect(),
        statements_applied,
    })
}

fn refresh_records(conn: &Connection, planned: &[BackupRecord]) -> RestoreResult<Vec<BackupRecord>> {
    let catalog = Catalog::new(conn);
    planned
        .iter()
        .map(|p| {
            let current = catalog
                .get(&p.id)?
                .ok_or_else(|| RestoreError::NotFound(p.id.clone()))?;
            if !current.is_completed() {
                return Err(RestoreError::IncompleteBackup {
                    id: current.id,
                    status: current.status,
                });
            }
            Ok(current)
        })
        .collect()
}

fn verify_plan(conn: &Connection, records: &[BackupRecord]) -> RestoreResult<()> {
    let catalog = Catalog::new(conn);
    let mut failures = Vec::new();

    for record in records {
        let outcome = verify_record(record);
        catalog.record_verification(&record.id, outcome.valid, outcome.corrupt, timestamp::now())?;
        if !outcome.valid {
            failures.push(format!("{}: {}", record.id, outcome.reasons.join(", ")));
        }
    }

    if !failures.is_empty() {
        tracing::warn!(failures = ?failures, "restore aborted by verification");
        return Err(RestoreError::PlanVerification { failures });
    }
    Ok(())
}

pub(crate) fn load_plan(records: &[BackupRecord]) -> RestoreResult<Vec<(&BackupRecord, Script)>> {
    records
        .iter()
        .map(|record| {
            let script = load_script(record).map_err(|e| match e {
                BackupError::Integrity { id, reason } => RestoreError::Integrity { id, reason },
                other => other.into(),
            })?;
            if script.header.kind != record.kind {
                return Err(RestoreError::Integrity {
                    id: record.id.clone(),
                    reason: format!("script kind {} does not match catalog", script.header.kind),
                });
            }
            Ok((record, script))
        })
        .collect()
}

/// Replay loaded scripts inside one transaction with foreign keys disabled.
///
/// Returns the number of statements applied. Foreign keys are re-enabled on
/// every path.
pub(crate) fn apply_plan(
    conn: &Connection,
    loaded: &[(&BackupRecord, Script)],
    scope: &RestoreScope,
    cancel: &CancellationToken,
    on_applied: &mut dyn FnMut(usize, &str),
) -> RestoreResult<usize> {
    // No effect inside a transaction, so set before BEGIN
    conn.execute_batch("PRAGMA foreign_keys = OFF;")
        .map_err(StoreError::from)?;

    let result = apply_in_transaction(conn, loaded, scope, cancel, on_applied);

    if let Err(e) = conn.execute_batch("PRAGMA foreign_keys = ON;") {
        tracing::error!(error = %e, "failed to re-enable foreign keys after restore");
    }
    result
}

fn apply_in_transaction(
    conn: &Connection,
    loaded: &[(&BackupRecord, Script)],
    scope: &RestoreScope,
    cancel: &CancellationToken,
    on_applied: &mut dyn FnMut(usize, &str),
) -> RestoreResult<usize> {
    let Some((anchor, _)) = loaded.first() else {
        return Ok(0);
    };

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
        .map_err(StoreError::from)?;

    for table in scope.tables().iter().rev() {
        tx.execute(&format!("DELETE FROM {}", quote_ident(table.name())), [])
            .map_err(|e| RestoreError::apply(&anchor.id, e))?;
    }

    let mut applied = 0;
    for (index, (record, script)) in loaded.iter().enumerate() {
        check_cancelled(cancel, true)?;

        for (table, sql) in script.statements() {
            if !scope.includes(table) {
                continue;
            }
            tx.execute_batch(sql)
                .map_err(|e| RestoreError::apply(&record.id, e))?;
            applied += 1;
        }

        tracing::debug!(backup_id = %record.id, "backup replayed");
        on_applied(index, &record.id);
    }
    check_cancelled(cancel, true)?;

    let last_id = loaded
        .last()
        .map(|(r, _)| r.id.as_str())
        .unwrap_or(anchor.id.as_str());
    let violations = foreign_key_violations(&tx).map_err(|e| RestoreError::apply(last_id, e))?;
    if !violations.is_empty() {
        if scope.is_all() {
            return Err(RestoreError::Apply {
                backup_id: last_id.to_string(),
                message: format!("foreign key violations: {}", violations.join("; ")),
                source: None,
            });
        }
        tracing::warn!(violations = ?violations, "partial restore left dangling references");
    }

    tx.commit().map_err(|e| RestoreError::apply(last_id, e))?;
    Ok(applied)
}

/// Rows violating foreign keys, as readable descriptions.
pub(crate) fn foreign_key_violations(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("PRAGMA foreign_key_check")?;
    let rows = stmt.query_map([], |row| {
        let table: String = row.get(0)?;
        let rowid: Option<i64> = row.get(1)?;
        let parent: String = row.get(2)?;
        Ok(match rowid {
            Some(rowid) => format!("{} row {} references missing {}", table, rowid, parent),
            None => format!("{} references missing {}", table, parent),
        })
    })?;
    rows.collect()
}

fn check_cancelled(cancel: &CancellationToken, rolled_back: bool) -> RestoreResult<()> {
    if cancel.is_cancelled() {
        tracing::warn!(rolled_back, "restore cancelled");
        return Err(RestoreError::Cancelled { rolled_back });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::{BackupKind, BackupStatus};
    use crate::store::Store;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Store, BackupConfig) {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open(&temp_dir.path().join("tasks.db")).unwrap();
        let config = BackupConfig::new(temp_dir.path().join("backups"));
        (temp_dir, store, config)
    }

    fn insert_board(conn: &Connection, id: &str) {
        let now = format_timestamp(timestamp::now());
        conn.execute(
            "INSERT INTO boards (id, name, created_at, updated_at) VALUES (?1, ?1, ?2, ?2)",
            rusqlite::params![id, now],
        )
        .unwrap();
    }

    fn board_ids(conn: &Connection) -> Vec<String> {
        let mut stmt = conn.prepare("SELECT id FROM boards ORDER BY id").unwrap();
        stmt.query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn test_full_restore_replaces_state() {
        let (_dir, store, config) = setup();
        let conn = store.lock().unwrap();
        insert_board(&conn, "kept");
        let full = BackupWriter::new(&conn, &config)
            .create(BackupKind::Full, &BackupOptions::default())
            .unwrap();
        insert_board(&conn, "later");

        let tracker = ProgressTracker::new();
        let report = execute_locked(
            &conn,
            &config,
            Some(&tracker),
            &[full.clone()],
            &RestoreScope::All,
            &RestoreOptions::default(),
        )
        .unwrap();

        assert_eq!(board_ids(&conn), vec!["kept"]);
        assert_eq!(report.applied_backups, vec![full.id]);
        assert!(report.statements_applied > 0);
        assert!(tracker.get_progress(&report.restore_id).unwrap().is_finished());

        let fk: bool = conn.query_row("PRAGMA foreign_keys", [], |r| r.get(0)).unwrap();
        assert!(fk);
    }

    #[test]
    fn test_preserve_takes_safety_backup() {
        let (_dir, store, config) = setup();
        let conn = store.lock().unwrap();
        let full = BackupWriter::new(&conn, &config)
            .create(BackupKind::Full, &BackupOptions::default())
            .unwrap();
        insert_board(&conn, "unsaved");

        let report = execute_locked(
            &conn,
            &config,
            None,
            &[full],
            &RestoreScope::All,
            &RestoreOptions::default().preserving(),
        )
        .unwrap();

        let safety_id = report.safety_backup_id.unwrap();
        let safety = Catalog::new(&conn).get(&safety_id).unwrap().unwrap();
        assert_eq!(safety.status, BackupStatus::Completed);
        assert!(safety.name.starts_with("pre-restore-"));
        assert!(board_ids(&conn).is_empty());
    }

    #[test]
    fn test_incomplete_record_rejected_before_touching() {
        let (_dir, store, config) = setup();
        let conn = store.lock().unwrap();
        let failed = BackupWriter::new(&conn, &config)
            .create(BackupKind::Incremental, &BackupOptions::default())
            .unwrap_err();
        assert!(matches!(failed, BackupError::ParentNotFound(None)));
        let record = Catalog::new(&conn).all().unwrap().remove(0);
        insert_board(&conn, "live");

        let err = execute_locked(
            &conn,
            &config,
            None,
            &[record],
            &RestoreScope::All,
            &RestoreOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RestoreError::IncompleteBackup { .. }));
        assert!(!err.store_was_touched());
        assert_eq!(board_ids(&conn), vec!["live"]);
    }

    #[test]
    fn test_cancel_before_apply_leaves_store() {
        let (_dir, store, config) = setup();
        let conn = store.lock().unwrap();
        let full = BackupWriter::new(&conn, &config)
            .create(BackupKind::Full, &BackupOptions::default())
            .unwrap();
        insert_board(&conn, "live");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = execute_locked(
            &conn,
            &config,
            None,
            &[full],
            &RestoreScope::All,
            &RestoreOptions::default().with_cancel(cancel),
        )
        .unwrap_err();

        assert!(matches!(err, RestoreError::Cancelled { rolled_back: false }));
        assert_eq!(board_ids(&conn), vec!["live"]);
    }

    #[test]
    fn test_scope_tables_in_dependency_order() {
        let scope = RestoreScope::Tables(vec![ManagedTable::TaskTags, ManagedTable::Boards]);
        assert_eq!(scope.tables(), vec![ManagedTable::Boards, ManagedTable::TaskTags]);
        assert!(scope.includes("boards"));
        assert!(!scope.includes("tasks"));
        assert!(RestoreScope::All.includes("anything"));
    }

    #[test]
    fn test_cancel_between_backups_rolls_back() {
        let (_dir, store, config) = setup();
        let conn = store.lock().unwrap();
        insert_board(&conn, "a");
        let full = BackupWriter::new(&conn, &config)
            .create(BackupKind::Full, &BackupOptions::default())
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        insert_board(&conn, "b");
        let inc = BackupWriter::new(&conn, &config)
            .create(
                BackupKind::Incremental,
                &BackupOptions::default().with_parent(&full.id),
            )
            .unwrap();
        insert_board(&conn, "live");
        let before = board_ids(&conn);

        let records = [full.clone(), inc];
        let loaded = load_plan(&records).unwrap();
        let cancel = CancellationToken::new();
        let mut applied = Vec::new();
        let mut on_applied = |_: usize, backup_id: &str| {
            applied.push(backup_id.to_string());
            cancel.cancel();
        };

        let err = apply_plan(&conn, &loaded, &RestoreScope::All, &cancel, &mut on_applied)
            .unwrap_err();

        assert!(matches!(err, RestoreError::Cancelled { rolled_back: true }));
        assert!(err.store_was_touched());
        assert_eq!(applied, vec![full.id]);
        assert_eq!(board_ids(&conn), before);

        let fk: bool = conn.query_row("PRAGMA foreign_keys", [], |r| r.get(0)).unwrap();
        assert!(fk);
    }

    #[test]
    fn test_failure_after_preserve_names_safety_backup() {
        let (_dir, store, config) = setup();
        let conn = store.lock().unwrap();
        let full = BackupWriter::new(&conn, &config)
            .create(BackupKind::Full, &BackupOptions::default())
            .unwrap();
        std::fs::write(&full.artifact_path, b"not a backup").unwrap();
        insert_board(&conn, "unsaved");

        let err = execute_locked(
            &conn,
            &config,
            None,
            &[full],
            &RestoreScope::All,
            &RestoreOptions::default().preserving(),
        )
        .unwrap_err();

        assert!(matches!(err.root(), RestoreError::PlanVerification { .. }));
        let safety_id = err.safety_backup_id().unwrap();
        let safety = Catalog::new(&conn).get(safety_id).unwrap().unwrap();
        assert_eq!(safety.status, BackupStatus::Completed);
        assert_eq!(board_ids(&conn), vec!["unsaved"]);
    }
}
