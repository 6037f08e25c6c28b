//! Restore-specific error types
//!
//! Every error carries a stable code in `TRACK_CATEGORY_NAME` form.
//! Restore failures are never persisted; they propagate to the caller and
//! leave the store as it was.

use thiserror::Error;

use crate::backup::{BackupError, BackupStatus};
use crate::store::StoreError;

/// Restore error.
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("backup not found: {0}")]
    NotFound(String),

    /// No completed full backup at or before the target
    #[error("no full backup at or before {target}")]
    NoBaseBackup { target: String },

    /// Restoration requested from a backup that is not `completed`
    #[error("backup {id} is {status}, only completed backups can be restored")]
    IncompleteBackup { id: String, status: BackupStatus },

    /// Pre-restore verification failed for one or more backups in the plan
    #[error("plan verification failed: {}", .failures.join("; "))]
    PlanVerification { failures: Vec<String> },

    /// An artifact could not be loaded for replay
    #[error("integrity check failed for backup {id}: {reason}")]
    Integrity { id: String, reason: String },

    /// Replay failed inside the restore transaction; the transaction was rolled back
    #[error("restore failed while applying backup {backup_id}: {message}")]
    Apply {
        backup_id: String,
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    /// Requested table is not a managed table
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// The caller cancelled the restore
    #[error("restore cancelled (rolled back: {rolled_back})")]
    Cancelled { rolled_back: bool },

    /// The restore failed after the current state was saved
    #[error("{source} (state before restore kept in backup {safety_backup_id})")]
    Preserved {
        safety_backup_id: String,
        source: Box<RestoreError>,
    },

    /// Taking the safety backup or reading the catalog failed
    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RestoreError {
    pub(crate) fn apply(backup_id: &str, source: rusqlite::Error) -> Self {
        RestoreError::Apply {
            backup_id: backup_id.to_string(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            RestoreError::NotFound(_) => "TRACK_RESTORE_NOT_FOUND",
            RestoreError::NoBaseBackup { .. } => "TRACK_RESTORE_NO_BASE_BACKUP",
            RestoreError::IncompleteBackup { .. } => "TRACK_RESTORE_INCOMPLETE_BACKUP",
            RestoreError::PlanVerification { .. } => "TRACK_RESTORE_PLAN_VERIFICATION",
            RestoreError::Integrity { .. } => "TRACK_RESTORE_INTEGRITY",
            RestoreError::Apply { .. } => "TRACK_RESTORE_APPLY",
            RestoreError::UnknownTable(_) => "TRACK_RESTORE_UNKNOWN_TABLE",
            RestoreError::Cancelled { .. } => "TRACK_RESTORE_CANCELLED",
            RestoreError::Preserved { source, .. } => source.code(),
            RestoreError::Backup(e) => e.code(),
            RestoreError::Store(e) => e.code(),
        }
    }

    /// Whether the restore got as far as mutating the store (and was
    /// rolled back), as opposed to failing before anything was touched.
    pub fn store_was_touched(&self) -> bool {
        match self {
            RestoreError::Apply { .. } => true,
            RestoreError::Cancelled { rolled_back } => *rolled_back,
            RestoreError::Preserved { source, .. } => source.store_was_touched(),
            _ => false,
        }
    }

    /// The failure itself, without the safety backup wrapper.
    pub fn root(&self) -> &RestoreError {
        match self {
            RestoreError::Preserved { source, .. } => source.root(),
            other => other,
        }
    }

    /// Backup holding the state from before a failed restore, if one was taken.
    pub fn safety_backup_id(&self) -> Option<&str> {
        match self {
            RestoreError::Preserved {
                safety_backup_id, ..
            } => Some(safety_backup_id),
            _ => None,
        }
    }
}

/// Result type for restore operations
pub type RestoreResult<T> = Result<T, RestoreError>;
