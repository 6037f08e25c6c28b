//! Shared helpers for trackdb integration tests

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use rusqlite::types::Value;
use tempfile::TempDir;

use trackdb::backup::{BackupConfig, BackupManager};
use trackdb::restore::RestoreManager;
use trackdb::store::timestamp::{format_timestamp, now};
use trackdb::store::{quote_ident, ManagedTable, Store};

/// Every managed table's rows, ordered by key, values rendered for comparison.
pub type StoreSnapshot = BTreeMap<String, Vec<Vec<String>>>;

pub struct TestEnv {
    pub dir: TempDir,
    pub store: Store,
    pub config: BackupConfig,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(|c| c)
    }

    /// Artifacts are plain SQL, so tests can edit them.
    pub fn uncompressed() -> Self {
        Self::with_config(|c| c.with_compression(false))
    }

    pub fn with_config(f: impl FnOnce(BackupConfig) -> BackupConfig) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = Store::open(&dir.path().join("tasks.db")).expect("Failed to open store");
        let config = f(BackupConfig::new(dir.path().join("backups")));
        Self { dir, store, config }
    }

    pub fn backups(&self) -> BackupManager {
        BackupManager::new(self.store.clone(), self.config.clone())
    }

    pub fn restores(&self) -> RestoreManager {
        RestoreManager::new(self.store.clone(), self.config.clone())
    }

    pub fn exec(&self, sql: &str) {
        self.store
            .lock()
            .unwrap()
            .execute_batch(sql)
            .unwrap_or_else(|e| panic!("{}: {}", sql, e));
    }

    pub fn add_board(&self, id: &str, name: &str) {
        let ts = stamp();
        self.exec(&format!(
            "INSERT INTO boards (id, name, created_at, updated_at) VALUES ('{id}', '{name}', '{ts}', '{ts}')"
        ));
    }

    pub fn add_task(&self, id: &str, board_id: &str, title: &str) {
        let ts = stamp();
        self.exec(&format!(
            "INSERT INTO tasks (id, board_id, title, created_at, updated_at) \
             VALUES ('{id}', '{board_id}', '{title}', '{ts}', '{ts}')"
        ));
    }

    pub fn rename_task(&self, id: &str, title: &str) {
        let ts = stamp();
        self.exec(&format!(
            "UPDATE tasks SET title = '{title}', updated_at = '{ts}' WHERE id = '{id}'"
        ));
    }

    pub fn add_tag(&self, id: &str, name: &str, task_id: &str) {
        let ts = stamp();
        self.exec(&format!(
            "INSERT INTO tags (id, name, created_at, updated_at) VALUES ('{id}', '{name}', '{ts}', '{ts}');
             INSERT INTO task_tags (task_id, tag_id) VALUES ('{task_id}', '{id}');"
        ));
    }

    pub fn add_note(&self, id: &str, task_id: &str, content: &str) {
        let ts = stamp();
        self.exec(&format!(
            "INSERT INTO notes (id, task_id, content, created_at, updated_at) \
             VALUES ('{id}', '{task_id}', '{content}', '{ts}', '{ts}')"
        ));
    }

    /// A small board with tasks, a tag and a note.
    pub fn seed(&self) {
        self.add_board("b1", "Sprint A");
        self.add_task("t1", "b1", "Write parser");
        self.add_task("t2", "b1", "Review parser");
        self.add_tag("g1", "urgent", "t1");
        self.add_note("n1", "t1", "it''s blocked on review");
    }

    pub fn task_title(&self, id: &str) -> Option<String> {
        self.store
            .lock()
            .unwrap()
            .query_row("SELECT title FROM tasks WHERE id = ?1", [id], |r| r.get(0))
            .ok()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        snapshot(&self.store)
    }
}

pub fn snapshot(store: &Store) -> StoreSnapshot {
    let conn = store.lock().unwrap();
    let mut out = StoreSnapshot::new();
    for table in ManagedTable::ALL {
        let columns: Vec<String> = table.columns().iter().map(|c| quote_ident(c)).collect();
        let order: Vec<String> = table.key_columns().iter().map(|c| quote_ident(c)).collect();
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {}",
            columns.join(", "),
            quote_ident(table.name()),
            order.join(", ")
        );
        let mut stmt = conn.prepare(&sql).unwrap();
        let rows = stmt
            .query_map([], |row| {
                (0..columns.len())
                    .map(|i| row.get::<_, Value>(i).map(|v| format!("{:?}", v)))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap();
        out.insert(table.name().to_string(), rows);
    }
    out
}

/// Current time in the store's timestamp format.
pub fn stamp() -> String {
    format_timestamp(now())
}

/// Let the clock move past the previous backup or write.
pub fn tick() {
    thread::sleep(Duration::from_millis(5));
}
