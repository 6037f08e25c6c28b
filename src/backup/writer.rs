//! Backup writer
//!
//! Drives one backup from catalog insert to finalized record:
//!
//! 1. Allocate id, insert `pending` row
//! 2. Transition to `in_progress`
//! 3. Export (full snapshot, or diff against the resolved parent)
//! 4. Optionally compress
//! 5. Write the artifact, checksum the on-disk bytes
//! 6. Finalize to `completed`, or to `failed` with the error message
//!
//! A failed backup keeps its catalog row and never leaves an artifact.

use std::fs;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::artifact::{artifact_path, cleanup_partial_artifact, write_artifact};
use super::catalog::Catalog;
use super::codec::{compress, compute_file_checksum};
use super::config::BackupConfig;
use super::diff::export_incremental;
use super::errors::{BackupError, BackupResult};
use super::exporter::export_full;
use super::record::{BackupKind, BackupRecord, BackupStatus};
use crate::store::timestamp::{self, format_timestamp};

/// Per-call options for backup creation.
#[derive(Debug, Clone, Default)]
pub struct BackupOptions {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Overrides [`BackupConfig::compress`]
    pub compress: Option<bool>,
    /// Required for incremental backups
    pub parent_id: Option<String>,
    pub cancel: CancellationToken,
}

impl BackupOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = Some(compress);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Creates backups on an already-locked connection.
pub struct BackupWriter<'a> {
    conn: &'a Connection,
    config: &'a BackupConfig,
}

impl<'a> BackupWriter<'a> {
    pub fn new(conn: &'a Connection, config: &'a BackupConfig) -> Self {
        Self { conn, config }
    }

    /// Create one backup and return its finalized record.
    pub fn create(&self, kind: BackupKind, opts: &BackupOptions) -> BackupResult<BackupRecord> {
        let id = Uuid::new_v4().to_string();
        let created_at = timestamp::now();
        let compressed = opts.compress.unwrap_or(self.config.compress);
        let path = artifact_path(&self.config.backup_dir, &id, compressed);

        let record = BackupRecord {
            id: id.clone(),
            name: opts
                .name
                .clone()
                .unwrap_or_else(|| default_name(kind, created_at)),
            description: opts.description.clone(),
            kind,
            status: BackupStatus::Pending,
            size_bytes: 0,
            compressed,
            checksum: None,
            artifact_path: path.clone(),
            parent_id: None,
            created_at,
            completed_at: None,
            error_message: None,
            verified: None,
            verified_at: None,
            expires_at: self.config.expires_at(created_at),
        };

        let catalog = Catalog::new(self.conn);
        catalog.insert_pending(&record)?;
        tracing::info!(backup_id = %id, kind = %kind, "backup started");

        let cancel = &opts.cancel;
        let result = (|| -> BackupResult<()> {
            catalog.mark_in_progress(&id)?;

            let created_text = format_timestamp(created_at);
            let summary = match kind {
                BackupKind::Full => export_full(self.conn, &created_text, cancel)?,
                BackupKind::Incremental => {
                    let parent = resolve_parent(&catalog, opts.parent_id.as_deref())?;
                    catalog.set_parent(&id, &parent.id)?;
                    let since = format_timestamp(parent.created_at);
                    export_incremental(self.conn, &created_text, &since, cancel)?
                }
            };
            check_cancelled(cancel)?;

            let bytes = if compressed {
                compress(summary.script.as_bytes())?
            } else {
                summary.script.into_bytes()
            };
            check_cancelled(cancel)?;

            write_artifact(&path, &bytes)?;
            check_cancelled(cancel)?;

            let checksum = compute_file_checksum(&path)?;
            let size = fs::metadata(&path)
                .map_err(|e| BackupError::io_error_at_path(&path, e))?
                .len();

            catalog.mark_completed(&id, size, &checksum, timestamp::now())?;
            tracing::info!(
                backup_id = %id,
                rows = summary.rows.values().sum::<usize>(),
                statements = summary.statements,
                size_bytes = size,
                "backup completed"
            );
            Ok(())
        })();

        if let Err(e) = result {
            cleanup_partial_artifact(&path);
            if let Err(mark_err) = catalog.mark_failed(&id, &e.to_string(), timestamp::now()) {
                tracing::error!(backup_id = %id, error = %mark_err, "failed to record backup failure");
            }
            tracing::error!(backup_id = %id, error = %e, "backup failed");
            return Err(e);
        }

        catalog
            .get(&id)?
            .ok_or_else(|| BackupError::NotFound(id.clone()))
    }
}

fn resolve_parent(catalog: &Catalog<'_>, parent_id: Option<&str>) -> BackupResult<BackupRecord> {
    let parent_id = parent_id.ok_or(BackupError::ParentNotFound(None))?;
    match catalog.get(parent_id)? {
        Some(parent) if parent.is_completed() => Ok(parent),
        _ => Err(BackupError::ParentNotFound(Some(parent_id.to_string()))),
    }
}

fn check_cancelled(cancel: &CancellationToken) -> BackupResult<()> {
    if cancel.is_cancelled() {
        return Err(BackupError::Cancelled);
    }
    Ok(())
}

fn default_name(kind: BackupKind, created_at: DateTime<Utc>) -> String {
    format!("{}-{}", kind, created_at.format("%Y%m%dT%H%M%SZ"))
}
