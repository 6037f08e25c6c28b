//! Backup subsystem for trackdb
//!
//! A backup is one artifact file plus one catalog row. Full backups capture
//! every managed table; incremental backups capture rows created or updated
//! after their parent was taken.
//!
//! # Creation sequence
//!
//! 1. Acquire the store lock
//! 2. Insert `pending` catalog row, move to `in_progress`
//! 3. Export inside one read transaction
//! 4. Compress (optional)
//! 5. Write `<id>.sql[.gz].partial`, fsync, rename
//! 6. Checksum the final file, mark `completed`
//! 7. Release the lock
//!
//! Any failure in 2-6 marks the row `failed`, removes the artifact, and is
//! returned to the caller.

mod artifact;
mod catalog;
mod codec;
mod config;
mod diff;
mod errors;
mod exporter;
mod record;
mod retention;
mod script;
mod verifier;
mod writer;

pub use catalog::Catalog;
pub use codec::{compress, compute_checksum, compute_file_checksum, decompress};
pub use config::BackupConfig;
pub use errors::{BackupError, BackupResult, ScriptError};
pub use exporter::ExportSummary;
pub use record::{BackupFilter, BackupKind, BackupRecord, BackupStatus};
pub use retention::select_expired;
pub use script::{Script, ScriptHeader, ScriptSection};
pub use verifier::{load_script, verify_record, VerificationReport};
pub use writer::{BackupOptions, BackupWriter};

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::store::Store;

/// Public backup operations over a store.
#[derive(Debug, Clone)]
pub struct BackupManager {
    store: Store,
    config: BackupConfig,
}

impl BackupManager {
    pub fn new(store: Store, config: BackupConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    pub fn create_full_backup(&self, opts: &BackupOptions) -> BackupResult<BackupRecord> {
        let conn = self.store.lock()?;
        BackupWriter::new(&conn, &self.config).create(BackupKind::Full, opts)
    }

    /// `opts.parent_id` must name a completed backup.
    pub fn create_incremental_backup(&self, opts: &BackupOptions) -> BackupResult<BackupRecord> {
        let conn = self.store.lock()?;
        BackupWriter::new(&conn, &self.config).create(BackupKind::Incremental, opts)
    }

    /// Whether backup `id` passes verification. Never fails: lookup and
    /// catalog errors count as invalid.
    pub fn verify_backup(&self, id: &str) -> bool {
        match self.verify_backup_report(id) {
            Ok(report) => report.valid,
            Err(e) => {
                tracing::warn!(backup_id = %id, error = %e, "verification could not run");
                false
            }
        }
    }

    /// Verify with the collected reasons.
    pub fn verify_backup_report(&self, id: &str) -> BackupResult<VerificationReport> {
        let conn = self.store.lock()?;
        verifier::verify(&conn, id)
    }

    pub fn list_backups(&self, filter: &BackupFilter) -> BackupResult<Vec<BackupRecord>> {
        let conn = self.store.lock()?;
        Catalog::new(&conn).list(filter)
    }

    pub fn get_backup_metadata(&self, id: &str) -> BackupResult<Option<BackupRecord>> {
        let conn = self.store.lock()?;
        Catalog::new(&conn).get(id)
    }

    /// Remove the catalog row and the artifact file.
    ///
    /// Refuses while another backup names `id` as its parent. A missing
    /// artifact file is logged and ignored.
    pub fn delete_backup(&self, id: &str) -> BackupResult<()> {
        let conn = self.store.lock()?;
        delete_locked(&conn, id)
    }

    /// Delete every expired backup that no surviving backup depends on.
    /// Returns the deleted ids.
    pub fn prune_expired(&self, now: DateTime<Utc>) -> BackupResult<Vec<String>> {
        let conn = self.store.lock()?;
        let records = Catalog::new(&conn).all()?;

        let mut deleted = Vec::new();
        for record in select_expired(&records, now) {
            delete_locked(&conn, &record.id)?;
            deleted.push(record.id.clone());
        }

        if !deleted.is_empty() {
            tracing::info!(count = deleted.len(), "pruned expired backups");
        }
        Ok(deleted)
    }
}

fn delete_locked(conn: &Connection, id: &str) -> BackupResult<()> {
    let catalog = Catalog::new(conn);
    let record = catalog
        .get(id)?
        .ok_or_else(|| BackupError::NotFound(id.to_string()))?;

    let children = catalog.children_of(id)?;
    if !children.is_empty() {
        return Err(BackupError::HasDependents {
            id: id.to_string(),
            count: children.len(),
        });
    }

    catalog.delete(id)?;
    if let Err(e) = artifact::remove_artifact(&record.artifact_path) {
        tracing::warn!(backup_id = %id, error = %e, "artifact could not be removed");
    }
    tracing::info!(backup_id = %id, "backup deleted");
    Ok(())
}
