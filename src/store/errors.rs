//! Store-level error types

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while opening or locking the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database file could not be opened or its directory created
    #[error("failed to open store at {path}: {message}")]
    Open { path: PathBuf, message: String },

    /// Schema could not be applied
    #[error("failed to apply store schema: {0}")]
    Schema(#[source] rusqlite::Error),

    /// A previous holder of the store lock panicked
    #[error("store lock poisoned")]
    LockPoisoned,

    /// Any other SQLite failure
    #[error("store error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Open { .. } => "TRACK_STORE_OPEN",
            StoreError::Schema(_) => "TRACK_STORE_SCHEMA",
            StoreError::LockPoisoned => "TRACK_STORE_LOCK_POISONED",
            StoreError::Sqlite(_) => "TRACK_STORE_SQLITE",
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
