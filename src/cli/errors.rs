//! CLI-specific error types
//!
//! Engine errors pass through with their own codes so the JSON error
//! response carries the most specific code available.

use std::io;

use thiserror::Error;

use crate::backup::BackupError;
use crate::restore::RestoreError;
use crate::store::StoreError;

/// CLI error
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration file missing, unreadable or invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// Argument that clap accepted but the command cannot use
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// stdout or log setup failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error(transparent)]
    Restore(#[from] RestoreError),
}

impl CliError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        CliError::Config(msg.into())
    }

    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            CliError::Config(_) => "TRACK_CLI_CONFIG_ERROR",
            CliError::InvalidArgument(_) => "TRACK_CLI_INVALID_ARGUMENT",
            CliError::Io(_) => "TRACK_CLI_IO_ERROR",
            CliError::Json(_) => "TRACK_CLI_JSON_ERROR",
            CliError::Store(e) => e.code(),
            CliError::Backup(e) => e.code(),
            CliError::Restore(e) => e.code(),
        }
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
