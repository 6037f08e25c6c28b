//! Store handle for trackdb
//!
//! The store is one SQLite database holding the managed task-tracking tables
//! and the backup catalog. A [`Store`] is passed explicitly to every component
//! that needs it; there is no process-wide handle.
//!
//! # Locking
//!
//! The connection sits behind a mutex. Holding the guard returned by
//! [`Store::lock`] is the exclusive execution lock: backup creation and
//! restoration hold it for their full duration, so writers sharing the handle
//! block instead of interleaving with them.

mod errors;
mod rows;
mod schema;
pub mod timestamp;

pub use errors::{StoreError, StoreResult};
pub use rows::{quote_ident, sql_literal, Board, ManagedRow, Note, Tag, Task, TaskTag};
pub use schema::{ManagedTable, CATALOG_SCHEMA_SQL, SCHEMA_SQL};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

/// Shared handle to the task-tracking database.
#[derive(Debug, Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl Store {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Open {
                path: path.to_path_buf(),
                message: format!("failed to create directory {}: {}", parent.display(), e),
            })?;
        }

        let conn = Connection::open(path).map_err(|e| StoreError::Open {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let store = Self::from_connection(conn, Some(path.to_path_buf()))?;
        tracing::debug!(path = %path.display(), "store opened");
        Ok(store)
    }

    /// Open a private in-memory database with the schema applied.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Open {
            path: PathBuf::from(":memory:"),
            message: e.to_string(),
        })?;
        Self::from_connection(conn, None)
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA_SQL).map_err(StoreError::Schema)?;
        conn.execute_batch(CATALOG_SCHEMA_SQL)
            .map_err(StoreError::Schema)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Acquire the exclusive execution lock.
    pub fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Database path, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Row count of every managed table.
    pub fn row_counts(&self) -> StoreResult<BTreeMap<ManagedTable, i64>> {
        let conn = self.lock()?;
        count_rows(&conn)
    }
}

/// Row count of every managed table on an already-locked connection.
pub fn count_rows(conn: &Connection) -> StoreResult<BTreeMap<ManagedTable, i64>> {
    let mut counts = BTreeMap::new();
    for table in ManagedTable::ALL {
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(table.name())),
            [],
            |row| row.get(0),
        )?;
        counts.insert(table, count);
    }
    Ok(counts)
}
