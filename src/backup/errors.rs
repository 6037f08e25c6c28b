//! Backup-specific error types
//!
//! Every error carries a stable code in `TRACK_CATEGORY_NAME` form.
//! Creation failures are recorded in the catalog (`status = failed`) and also
//! returned to the caller, so both the audit trail and the caller see them.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::store::StoreError;

/// Structural problems found while parsing an artifact script.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    /// The leading header comment is missing or malformed
    #[error("missing or malformed header: {0}")]
    Header(String),

    /// BEGIN/COMMIT or the foreign-key pragmas are missing, duplicated or out of order
    #[error("unbalanced transaction envelope: {0}")]
    UnbalancedEnvelope(String),

    /// A statement sits outside BEGIN/COMMIT or outside any table section
    #[error("statement outside envelope: {0}")]
    StrayStatement(String),

    /// Input ends inside a statement or quoted literal
    #[error("unterminated statement at end of script")]
    Unterminated,
}

/// Backup error.
#[derive(Debug, Error)]
pub enum BackupError {
    /// Reading or serializing a managed table failed
    #[error("export of table `{table}` failed: {source}")]
    Export {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Incremental backup without a usable parent
    #[error(
        "parent backup not found or not completed: {}",
        .0.as_deref().unwrap_or("<none given>")
    )]
    ParentNotFound(Option<String>),

    /// No catalog record with this id
    #[error("backup not found: {0}")]
    NotFound(String),

    /// Deleting would orphan incremental backups
    #[error("backup {id} is the parent of {count} other backup(s)")]
    HasDependents { id: String, count: usize },

    /// Artifact failed checksum or structural validation
    #[error("integrity check failed for backup {id}: {reason}")]
    Integrity { id: String, reason: String },

    /// gzip encode/decode failure
    #[error("compression failed: {0}")]
    Compression(#[source] io::Error),

    /// File system failure on the artifact or backup directory
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Catalog read or write failure
    #[error("catalog error: {0}")]
    Catalog(#[from] rusqlite::Error),

    /// The caller cancelled the operation
    #[error("backup cancelled")]
    Cancelled,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BackupError {
    /// Creates an I/O error at a specific path
    pub fn io_error_at_path(path: &std::path::Path, source: io::Error) -> Self {
        BackupError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            BackupError::Export { .. } => "TRACK_BACKUP_EXPORT",
            BackupError::ParentNotFound(_) => "TRACK_BACKUP_PARENT_NOT_FOUND",
            BackupError::NotFound(_) => "TRACK_BACKUP_NOT_FOUND",
            BackupError::HasDependents { .. } => "TRACK_BACKUP_HAS_DEPENDENTS",
            BackupError::Integrity { .. } => "TRACK_BACKUP_INTEGRITY",
            BackupError::Compression(_) => "TRACK_BACKUP_COMPRESSION",
            BackupError::Io { .. } => "TRACK_BACKUP_IO",
            BackupError::Catalog(_) => "TRACK_BACKUP_CATALOG",
            BackupError::Cancelled => "TRACK_BACKUP_CANCELLED",
            BackupError::Store(e) => e.code(),
        }
    }
}

/// Result type for backup operations
pub type BackupResult<T> = Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_not_found_display() {
        let err = BackupError::ParentNotFound(None);
        assert!(err.to_string().contains("<none given>"));

        let err = BackupError::ParentNotFound(Some("abc".into()));
        assert!(err.to_string().contains("abc"));
        assert_eq!(err.code(), "TRACK_BACKUP_PARENT_NOT_FOUND");
    }

    #[test]
    fn test_io_error_mentions_path() {
        let err = BackupError::io_error_at_path(
            std::path::Path::new("/backups/x.sql"),
            io::Error::new(io::ErrorKind::Other, "disk full"),
        );
        let display = err.to_string();
        assert!(display.contains("/backups/x.sql"));
        assert!(display.contains("disk full"));
        assert_eq!(err.code(), "TRACK_BACKUP_IO");
    }

    #[test]
    fn test_store_error_code_passthrough() {
        let err = BackupError::from(StoreError::LockPoisoned);
        assert_eq!(err.code(), "TRACK_STORE_LOCK_POISONED");
    }
}
