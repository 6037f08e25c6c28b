//! Backup catalog
//!
//! One row per backup in `backup_catalog`. The catalog is the only durable
//! record of backup lineage; artifacts on disk are located through it.
//!
//! Status moves `pending → in_progress → completed | failed`. The `mark_*`
//! updates are guarded by the expected source status so a record is finalized
//! exactly once.

use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::errors::{BackupError, BackupResult};
use super::record::{BackupFilter, BackupKind, BackupRecord, BackupStatus};
use crate::store::timestamp::{format_timestamp, parse_timestamp};

const SELECT_COLUMNS: &str = "id, name, description, kind, status, size_bytes, compressed, \
     checksum, artifact_path, parent_id, created_at, completed_at, error_message, verified, \
     verified_at, expires_at";

/// Catalog access on a borrowed connection.
pub struct Catalog<'c> {
    conn: &'c Connection,
}

impl<'c> Catalog<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Insert a new record in `pending`.
    ///
    /// `parent_id` is not written here; see [`Catalog::set_parent`].
    pub fn insert_pending(&self, record: &BackupRecord) -> BackupResult<()> {
        self.conn.execute(
            "INSERT INTO backup_catalog (id, name, description, kind, status, size_bytes, \
             compressed, artifact_path, created_at, expires_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?8, ?9)",
            params![
                record.id,
                record.name,
                record.description,
                record.kind.as_str(),
                BackupStatus::Pending.as_str(),
                record.compressed,
                record.artifact_path.to_string_lossy().into_owned(),
                format_timestamp(record.created_at),
                record.expires_at.map(format_timestamp),
            ],
        )?;
        Ok(())
    }

    pub fn mark_in_progress(&self, id: &str) -> BackupResult<()> {
        let updated = self.conn.execute(
            "UPDATE backup_catalog SET status = ?2 WHERE id = ?1 AND status = ?3",
            params![
                id,
                BackupStatus::InProgress.as_str(),
                BackupStatus::Pending.as_str()
            ],
        )?;
        expect_one(updated, id)
    }

    /// Link an incremental record to its resolved parent.
    pub fn set_parent(&self, id: &str, parent_id: &str) -> BackupResult<()> {
        let updated = self.conn.execute(
            "UPDATE backup_catalog SET parent_id = ?2 WHERE id = ?1",
            params![id, parent_id],
        )?;
        expect_one(updated, id)
    }

    pub fn mark_completed(
        &self,
        id: &str,
        size_bytes: u64,
        checksum: &str,
        completed_at: DateTime<Utc>,
    ) -> BackupResult<()> {
        let updated = self.conn.execute(
            "UPDATE backup_catalog SET status = ?2, size_bytes = ?3, checksum = ?4, \
             completed_at = ?5, error_message = NULL \
             WHERE id = ?1 AND status IN ('pending', 'in_progress')",
            params![
                id,
                BackupStatus::Completed.as_str(),
                i64::try_from(size_bytes).unwrap_or(i64::MAX),
                checksum,
                format_timestamp(completed_at),
            ],
        )?;
        expect_one(updated, id)
    }

    pub fn mark_failed(
        &self,
        id: &str,
        message: &str,
        completed_at: DateTime<Utc>,
    ) -> BackupResult<()> {
        let updated = self.conn.execute(
            "UPDATE backup_catalog SET status = ?2, checksum = NULL, error_message = ?3, \
             completed_at = ?4 \
             WHERE id = ?1 AND status IN ('pending', 'in_progress')",
            params![
                id,
                BackupStatus::Failed.as_str(),
                message,
                format_timestamp(completed_at),
            ],
        )?;
        expect_one(updated, id)
    }

    /// Cache a verification outcome. A failed check on a `completed`
    /// record with `corrupt` set flips it to `corrupted`.
    pub fn record_verification(
        &self,
        id: &str,
        valid: bool,
        corrupt: bool,
        at: DateTime<Utc>,
    ) -> BackupResult<()> {
        let updated = self.conn.execute(
            "UPDATE backup_catalog SET verified = ?2, verified_at = ?3 WHERE id = ?1",
            params![id, valid, format_timestamp(at)],
        )?;
        expect_one(updated, id)?;

        if !valid && corrupt {
            self.conn.execute(
                "UPDATE backup_catalog SET status = ?2 WHERE id = ?1 AND status = ?3",
                params![
                    id,
                    BackupStatus::Corrupted.as_str(),
                    BackupStatus::Completed.as_str()
                ],
            )?;
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> BackupResult<Option<BackupRecord>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {} FROM backup_catalog WHERE id = ?1", SELECT_COLUMNS),
                params![id],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Records matching `filter`, newest first.
    pub fn list(&self, filter: &BackupFilter) -> BackupResult<Vec<BackupRecord>> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(kind) = filter.kind {
            values.push(Value::Text(kind.as_str().to_string()));
            clauses.push(format!("kind = ?{}", values.len()));
        }
        if let Some(status) = filter.status {
            values.push(Value::Text(status.as_str().to_string()));
            clauses.push(format!("status = ?{}", values.len()));
        }
        if let Some(after) = filter.created_after {
            values.push(Value::Text(format_timestamp(after)));
            clauses.push(format!("created_at >= ?{}", values.len()));
        }
        if let Some(before) = filter.created_before {
            values.push(Value::Text(format_timestamp(before)));
            clauses.push(format!("created_at <= ?{}", values.len()));
        }

        let mut sql = format!("SELECT {} FROM backup_catalog", SELECT_COLUMNS);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_from_iter(values), record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Every record, oldest first.
    pub fn all(&self) -> BackupResult<Vec<BackupRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM backup_catalog ORDER BY created_at ASC, id ASC",
            SELECT_COLUMNS
        ))?;
        let records = stmt
            .query_map([], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Ids of records naming `id` as their parent.
    pub fn children_of(&self, id: &str) -> BackupResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM backup_catalog WHERE parent_id = ?1 ORDER BY created_at")?;
        let ids = stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    /// Remove the row. Returns whether a row existed.
    pub fn delete(&self, id: &str) -> BackupResult<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM backup_catalog WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }
}

fn expect_one(updated: usize, id: &str) -> BackupResult<()> {
    if updated == 0 {
        return Err(BackupError::NotFound(id.to_string()));
    }
    Ok(())
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    parse_timestamp(&text).ok_or_else(|| conversion_error(idx, format!("invalid timestamp `{}`", text)))
}

fn optional_timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        parse_timestamp(&t).ok_or_else(|| conversion_error(idx, format!("invalid timestamp `{}`", t)))
    })
    .transpose()
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<BackupRecord> {
    let kind: String = row.get(3)?;
    let status: String = row.get(4)?;
    let size: i64 = row.get(5)?;
    let artifact_path: String = row.get(8)?;

    Ok(BackupRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        kind: BackupKind::parse(&kind)
            .ok_or_else(|| conversion_error(3, format!("unknown backup kind `{}`", kind)))?,
        status: BackupStatus::parse(&status)
            .ok_or_else(|| conversion_error(4, format!("unknown backup status `{}`", status)))?,
        size_bytes: u64::try_from(size).unwrap_or(0),
        compressed: row.get(6)?,
        checksum: row.get(7)?,
        artifact_path: artifact_path.into(),
        parent_id: row.get(9)?,
        created_at: timestamp_at(row, 10)?,
        completed_at: optional_timestamp_at(row, 11)?,
        error_message: row.get(12)?,
        verified: row.get(13)?,
        verified_at: optional_timestamp_at(row, 14)?,
        expires_at: optional_timestamp_at(row, 15)?,
    })
}
