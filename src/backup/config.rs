//! Backup configuration

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};

/// Configuration for backup creation.
#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Directory holding artifact files.
    pub backup_dir: PathBuf,
    /// Whether artifacts are gzip-compressed unless a call overrides it.
    pub compress: bool,
    /// Days a new backup is kept before `prune_expired` may delete it.
    pub retention_days: Option<u32>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            backup_dir: PathBuf::from("./backups"),
            compress: true,
            retention_days: None,
        }
    }
}

impl BackupConfig {
    pub fn new(backup_dir: impl AsRef<Path>) -> Self {
        Self {
            backup_dir: backup_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = Some(days);
        self
    }

    /// Expiry for a backup created at `created_at`, if retention is set.
    pub fn expires_at(&self, created_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.retention_days
            .map(|days| created_at + Duration::days(i64::from(days)))
    }
}
