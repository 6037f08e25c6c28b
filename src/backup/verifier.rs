//! Integrity verification
//!
//! Verification fails closed: a missing or unreadable artifact, a checksum
//! mismatch, or a script whose envelope does not parse all make a backup
//! invalid. Only the catalog's cached outcome is ever written; the artifact
//! is read-only here.

use rusqlite::Connection;
use serde::Serialize;

use super::artifact::{decode_artifact, read_artifact};
use super::catalog::Catalog;
use super::codec::compute_checksum;
use super::errors::{BackupError, BackupResult};
use super::record::BackupRecord;
use super::script::Script;
use crate::store::timestamp;

/// Outcome of verifying one backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub backup_id: String,
    pub valid: bool,
    pub reasons: Vec<String>,
    /// The artifact exists but its content does not match the catalog
    pub corrupt: bool,
}

impl VerificationReport {
    fn new(backup_id: &str) -> Self {
        Self {
            backup_id: backup_id.to_string(),
            valid: true,
            reasons: Vec::new(),
            corrupt: false,
        }
    }

    fn fail(&mut self, reason: impl Into<String>, corrupt: bool) {
        self.valid = false;
        self.corrupt |= corrupt;
        self.reasons.push(reason.into());
    }
}

/// Check a record's artifact without touching the catalog.
pub fn verify_record(record: &BackupRecord) -> VerificationReport {
    let mut report = VerificationReport::new(&record.id);

    if !record.status.has_checksum() {
        report.fail(format!("backup status is {}", record.status), false);
        return report;
    }
    let Some(expected) = record.checksum.as_deref() else {
        report.fail("no checksum recorded", false);
        return report;
    };

    let bytes = match read_artifact(&record.artifact_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            report.fail(format!("artifact unreadable: {}", e), false);
            return report;
        }
    };

    let actual = compute_checksum(&bytes);
    if actual != expected {
        report.fail(
            format!("checksum mismatch: expected {}, found {}", expected, actual),
            true,
        );
        return report;
    }

    match decode_artifact(&bytes, record.compressed) {
        Err(e) => report.fail(format!("artifact does not decode: {}", e), true),
        Ok(text) => match Script::parse(&text) {
            Err(e) => report.fail(format!("invalid script: {}", e), true),
            Ok(script) if script.header.kind != record.kind => report.fail(
                format!(
                    "script kind {} does not match catalog kind {}",
                    script.header.kind, record.kind
                ),
                true,
            ),
            Ok(_) => {}
        },
    }

    report
}

/// Verify backup `id` and cache the outcome in the catalog.
///
/// A checksum or structural failure flips a `completed` record to
/// `corrupted`.
pub fn verify(conn: &Connection, id: &str) -> BackupResult<VerificationReport> {
    let catalog = Catalog::new(conn);
    let record = catalog
        .get(id)?
        .ok_or_else(|| BackupError::NotFound(id.to_string()))?;

    let report = verify_record(&record);
    catalog.record_verification(id, report.valid, report.corrupt, timestamp::now())?;

    if report.valid {
        tracing::info!(backup_id = %id, "backup verified");
    } else {
        tracing::warn!(backup_id = %id, reasons = ?report.reasons, "backup failed verification");
    }
    Ok(report)
}

/// Read, decode and parse a record's artifact for replay.
///
/// Any failure is reported as an integrity error on that backup.
pub fn load_script(record: &BackupRecord) -> BackupResult<Script> {
    let integrity = |reason: String| BackupError::Integrity {
        id: record.id.clone(),
        reason,
    };

    let bytes = read_artifact(&record.artifact_path).map_err(|e| integrity(e.to_string()))?;
    let text = decode_artifact(&bytes, record.compressed).map_err(|e| integrity(e.to_string()))?;
    Script::parse(&text).map_err(|e| integrity(e.to_string()))
}
