//! Restoration validation
//!
//! Checks that a backup could be restored without restoring it:
//! - Verify every artifact in the chain
//! - Load and parse every script
//! - Replay the chain into a scratch in-memory store
//! - Report per-table row counts and foreign key problems
//!
//! The live store is only read.

use rusqlite::Connection;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::errors::{RestoreError, RestoreResult};
use super::executor::{apply_plan, load_plan, RestoreScope};
use super::planner::plan_through;
use crate::backup::{verify_record, BackupRecord, Catalog};
use crate::store::{count_rows, ManagedTable, Store};

/// Expected state of one managed table after restoration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCheck {
    pub table: String,
    /// The anchor artifact has a section for this table
    pub present: bool,
    pub row_count: i64,
}

/// Result of validating a restoration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestorationValidation {
    pub backup_id: String,
    pub valid: bool,
    pub table_checks: Vec<TableCheck>,
    pub errors: Vec<String>,
}

impl RestorationValidation {
    fn invalid(backup_id: &str, errors: Vec<String>) -> Self {
        Self {
            backup_id: backup_id.to_string(),
            valid: false,
            table_checks: Vec::new(),
            errors,
        }
    }
}

/// Validate restoring backup `id`. Unknown ids are an error; every other
/// problem is reported in the result.
pub(crate) fn validate_locked(conn: &Connection, id: &str) -> RestoreResult<RestorationValidation> {
    let records = Catalog::new(conn).all()?;
    let plan = match plan_through(&records, id) {
        Ok(plan) => plan,
        Err(e @ RestoreError::NotFound(_)) => return Err(e),
        Err(e) => return Ok(RestorationValidation::invalid(id, vec![e.to_string()])),
    };
    let chain: Vec<BackupRecord> = plan.records(&records).into_iter().cloned().collect();

    let errors: Vec<String> = chain
        .iter()
        .map(verify_record)
        .filter(|report| !report.valid)
        .map(|report| format!("{}: {}", report.backup_id, report.reasons.join(", ")))
        .collect();
    if !errors.is_empty() {
        return Ok(RestorationValidation::invalid(id, errors));
    }

    let loaded = match load_plan(&chain) {
        Ok(loaded) => loaded,
        Err(e) => return Ok(RestorationValidation::invalid(id, vec![e.to_string()])),
    };

    let scratch = Store::open_in_memory()?;
    let scratch_conn = scratch.lock()?;
    let mut errors = Vec::new();
    if let Err(e) = apply_plan(
        &scratch_conn,
        &loaded,
        &RestoreScope::All,
        &CancellationToken::new(),
        &mut |_, _| {},
    ) {
        errors.push(e.to_string());
    }

    let counts = count_rows(&scratch_conn)?;
    let anchor = &loaded[0].1;
    let table_checks = ManagedTable::ALL
        .into_iter()
        .map(|table| TableCheck {
            table: table.name().to_string(),
            present: anchor.has_table(table.name()),
            row_count: counts.get(&table).copied().unwrap_or(0),
        })
        .collect();

    let valid = errors.is_empty();
    tracing::info!(backup_id = %id, valid, "restoration validated");
    Ok(RestorationValidation {
        backup_id: id.to_string(),
        valid,
        table_checks,
        errors,
    })
}
