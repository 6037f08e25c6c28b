//! Snapshot exporter
//!
//! Serializes schema and rows of every managed table into an artifact
//! script. All tables are read inside one read transaction so the exported
//! tables are mutually consistent.

use std::collections::BTreeMap;

use rusqlite::{params, Connection};
use tokio_util::sync::CancellationToken;

use super::errors::{BackupError, BackupResult};
use super::record::BackupKind;
use super::script::{ScriptBuilder, ScriptHeader};
use crate::store::{quote_ident, Board, ManagedRow, ManagedTable, Note, Tag, Task, TaskTag};

/// Output of an exporter run.
#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub script: String,
    pub rows: BTreeMap<ManagedTable, usize>,
    /// Body statements written, DDL included
    pub statements: usize,
    pub warnings: Vec<String>,
}

impl ExportSummary {
    pub fn total_rows(&self) -> usize {
        self.rows.values().sum()
    }
}

/// Export the full state of the store.
pub fn export_full(
    conn: &Connection,
    created_at: &str,
    cancel: &CancellationToken,
) -> BackupResult<ExportSummary> {
    // Read-only; rolled back on drop
    let tx = conn
        .unchecked_transaction()
        .map_err(|source| BackupError::Export {
            table: "<snapshot>".to_string(),
            source,
        })?;

    let mut builder = ScriptBuilder::new(&ScriptHeader {
        kind: BackupKind::Full,
        created_at: created_at.to_string(),
        changes_since: None,
        warnings: Vec::new(),
    });
    let mut rows = BTreeMap::new();

    for table in ManagedTable::ALL {
        if cancel.is_cancelled() {
            return Err(BackupError::Cancelled);
        }

        builder.begin_table(table.name());
        builder.push_statement(&table_ddl(&tx, table)?);
        let count = write_table(&tx, table, &mut builder, "INSERT", None)?;
        tracing::debug!(table = %table, rows = count, "exported table");
        rows.insert(table, count);
    }

    Ok(ExportSummary {
        statements: builder.statement_count(),
        script: builder.finish(),
        rows,
        warnings: Vec::new(),
    })
}

/// `CREATE TABLE` statement for `table` as stored in `sqlite_master`,
/// made idempotent.
fn table_ddl(conn: &Connection, table: ManagedTable) -> BackupResult<String> {
    let ddl: String = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table.name()],
            |row| row.get(0),
        )
        .map_err(|source| BackupError::Export {
            table: table.name().to_string(),
            source,
        })?;
    Ok(idempotent_ddl(&ddl))
}

fn idempotent_ddl(ddl: &str) -> String {
    const PREFIX: &str = "CREATE TABLE";
    let trimmed = ddl.trim();
    let upper = trimmed.to_ascii_uppercase();

    if upper.starts_with("CREATE TABLE IF NOT EXISTS") || !upper.starts_with(PREFIX) {
        trimmed.to_string()
    } else {
        format!("CREATE TABLE IF NOT EXISTS{}", &trimmed[PREFIX.len()..])
    }
}

/// Append one insert statement per selected row of `table`.
///
/// With `since`, only rows created or updated strictly after it are
/// selected; the table must carry timestamps.
pub(crate) fn write_table(
    conn: &Connection,
    table: ManagedTable,
    builder: &mut ScriptBuilder,
    verb: &str,
    since: Option<&str>,
) -> BackupResult<usize> {
    match table {
        ManagedTable::Boards => write_rows::<Board>(conn, builder, verb, since),
        ManagedTable::Tasks => write_rows::<Task>(conn, builder, verb, since),
        ManagedTable::Notes => write_rows::<Note>(conn, builder, verb, since),
        ManagedTable::Tags => write_rows::<Tag>(conn, builder, verb, since),
        ManagedTable::TaskTags => write_rows::<TaskTag>(conn, builder, verb, since),
    }
}

fn write_rows<R: ManagedRow>(
    conn: &Connection,
    builder: &mut ScriptBuilder,
    verb: &str,
    since: Option<&str>,
) -> BackupResult<usize> {
    let table = R::TABLE;
    let export_err = |source: rusqlite::Error| BackupError::Export {
        table: table.name().to_string(),
        source,
    };

    let columns: Vec<String> = table.columns().iter().map(|c| quote_ident(c)).collect();
    let order: Vec<String> = table.key_columns().iter().map(|c| quote_ident(c)).collect();
    let filter = if since.is_some() {
        " WHERE created_at > ?1 OR updated_at > ?1"
    } else {
        ""
    };
    let sql = format!(
        "SELECT {} FROM {}{} ORDER BY {}",
        columns.join(", "),
        quote_ident(table.name()),
        filter,
        order.join(", ")
    );

    let mut stmt = conn.prepare(&sql).map_err(export_err)?;
    let rows = match since {
        Some(since) => stmt.query_map(params![since], R::from_row),
        None => stmt.query_map([], R::from_row),
    }
    .map_err(export_err)?;

    let mut count = 0;
    for row in rows {
        let row = row.map_err(export_err)?;
        builder.push_statement(&row.insert_statement(verb));
        count += 1;
    }
    Ok(count)
}
