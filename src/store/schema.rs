//! Managed tables and schema DDL
//!
//! The managed tables are the task-tracking domain tables that backups
//! capture and restores replace. The catalog table is deliberately not
//! managed: restoring data never rewrites backup history.

use std::fmt;

/// Domain schema, applied idempotently on open.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS boards (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    board_id TEXT NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    description TEXT,
    status TEXT NOT NULL DEFAULT 'todo',
    priority INTEGER NOT NULL DEFAULT 0,
    estimate_hours REAL,
    due_date TEXT,
    position INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS notes (
    id TEXT PRIMARY KEY,
    task_id TEXT REFERENCES tasks(id) ON DELETE CASCADE,
    board_id TEXT REFERENCES boards(id) ON DELETE CASCADE,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tags (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    color TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS task_tags (
    task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    tag_id TEXT NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    PRIMARY KEY (task_id, tag_id)
);

CREATE INDEX IF NOT EXISTS idx_tasks_board ON tasks(board_id);
CREATE INDEX IF NOT EXISTS idx_notes_task ON notes(task_id);
"#;

/// Backup catalog schema. One row per backup, parent linkage to the same table.
pub const CATALOG_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS backup_catalog (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    kind TEXT NOT NULL CHECK (kind IN ('full', 'incremental')),
    status TEXT NOT NULL,
    size_bytes INTEGER NOT NULL DEFAULT 0,
    compressed INTEGER NOT NULL DEFAULT 0,
    checksum TEXT,
    artifact_path TEXT NOT NULL,
    parent_id TEXT REFERENCES backup_catalog(id),
    created_at TEXT NOT NULL,
    completed_at TEXT,
    error_message TEXT,
    verified INTEGER,
    verified_at TEXT,
    expires_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_backup_catalog_created ON backup_catalog(created_at);
"#;

/// A table whose rows are captured by backups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ManagedTable {
    Boards,
    Tasks,
    Notes,
    Tags,
    TaskTags,
}

impl ManagedTable {
    /// All managed tables in dependency order (parents first).
    ///
    /// Export and replay use this order; deletion uses it reversed.
    pub const ALL: [ManagedTable; 5] = [
        ManagedTable::Boards,
        ManagedTable::Tasks,
        ManagedTable::Notes,
        ManagedTable::Tags,
        ManagedTable::TaskTags,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ManagedTable::Boards => "boards",
            ManagedTable::Tasks => "tasks",
            ManagedTable::Notes => "notes",
            ManagedTable::Tags => "tags",
            ManagedTable::TaskTags => "task_tags",
        }
    }

    /// Parse from a table name
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    /// Column list in the order rows are encoded.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            ManagedTable::Boards => &["id", "name", "description", "created_at", "updated_at"],
            ManagedTable::Tasks => &[
                "id",
                "board_id",
                "title",
                "description",
                "status",
                "priority",
                "estimate_hours",
                "due_date",
                "position",
                "created_at",
                "updated_at",
            ],
            ManagedTable::Notes => &[
                "id",
                "task_id",
                "board_id",
                "content",
                "created_at",
                "updated_at",
            ],
            ManagedTable::Tags => &["id", "name", "color", "created_at", "updated_at"],
            ManagedTable::TaskTags => &["task_id", "tag_id"],
        }
    }

    /// Primary key columns, used for deterministic ordering.
    pub fn key_columns(&self) -> &'static [&'static str] {
        match self {
            ManagedTable::TaskTags => &["task_id", "tag_id"],
            _ => &["id"],
        }
    }

    /// Whether rows carry `created_at`/`updated_at`, which the incremental
    /// diff needs to find changed rows.
    pub fn has_timestamps(&self) -> bool {
        !matches!(self, ManagedTable::TaskTags)
    }
}

impl fmt::Display for ManagedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
