//! Backup catalog record types

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Full snapshot or changes relative to a parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupKind {
    Full,
    Incremental,
}

impl BackupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
        }
    }

    /// Parse from string representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "full" => Some(Self::Full),
            "incremental" => Some(Self::Incremental),
            _ => None,
        }
    }
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status.
///
/// `Pending → InProgress → Completed | Failed`, finalized exactly once.
/// A later verification may flip `Completed` to `Corrupted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Corrupted,
}

impl BackupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Corrupted => "corrupted",
        }
    }

    /// Parse from string representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "corrupted" => Some(Self::Corrupted),
            _ => None,
        }
    }

    /// Whether a checksum is recorded in this status
    pub fn has_checksum(&self) -> bool {
        matches!(self, Self::Completed | Self::Corrupted)
    }
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One catalog row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub kind: BackupKind,
    pub status: BackupStatus,
    pub size_bytes: u64,
    pub compressed: bool,
    pub checksum: Option<String>,
    pub artifact_path: PathBuf,
    pub parent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    /// Outcome of the last verification, `None` if never verified
    pub verified: Option<bool>,
    pub verified_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl BackupRecord {
    pub fn is_completed(&self) -> bool {
        self.status == BackupStatus::Completed
    }

    pub fn is_full(&self) -> bool {
        self.kind == BackupKind::Full
    }
}

/// Listing filter. Empty filter lists everything.
#[derive(Debug, Clone, Default)]
pub struct BackupFilter {
    pub kind: Option<BackupKind>,
    pub status: Option<BackupStatus>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl BackupFilter {
    pub fn kind(mut self, kind: BackupKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn status(mut self, status: BackupStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, record: &BackupRecord) -> bool {
        self.kind.map_or(true, |k| record.kind == k)
            && self.status.map_or(true, |s| record.status == s)
            && self.created_after.map_or(true, |t| record.created_at >= t)
            && self.created_before.map_or(true, |t| record.created_at <= t)
    }
}
