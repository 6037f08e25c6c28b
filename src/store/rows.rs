//! Typed rows for the managed tables
//!
//! Every query result crossing the data-access boundary is decoded into one of
//! these structs. Column order follows [`ManagedTable::columns`].

use rusqlite::types::Value;
use rusqlite::Row;

use super::schema::ManagedTable;

/// A row of a managed table.
pub trait ManagedRow: Sized {
    const TABLE: ManagedTable;

    /// Decode from a row selected with the table's column list.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    /// Encode as SQL values in column order.
    fn to_values(&self) -> Vec<Value>;

    /// Render an insert statement with the given verb
    /// (`INSERT` or `INSERT OR REPLACE`).
    fn insert_statement(&self, verb: &str) -> String {
        let columns: Vec<String> = Self::TABLE
            .columns()
            .iter()
            .map(|c| quote_ident(c))
            .collect();
        let values: Vec<String> = self.to_values().iter().map(sql_literal).collect();
        format!(
            "{} INTO {} ({}) VALUES ({})",
            verb,
            quote_ident(Self::TABLE.name()),
            columns.join(", "),
            values.join(", ")
        )
    }
}

/// Quote an identifier with double quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Render a value as a SQL literal that SQLite reads back unchanged.
pub fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) if f.is_nan() => "NULL".to_string(),
        Value::Real(f) if f.is_infinite() => {
            let literal = if *f > 0.0 { "9e999" } else { "-9e999" };
            literal.to_string()
        }
        // Debug output is the shortest representation that parses back to
        // the same f64 and always carries a '.' or exponent.
        Value::Real(f) => format!("{:?}", f),
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Blob(b) => {
            let hex: String = b.iter().map(|byte| format!("{:02x}", byte)).collect();
            format!("X'{}'", hex)
        }
    }
}

fn opt_text(value: &Option<String>) -> Value {
    value.clone().map_or(Value::Null, Value::Text)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Board {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ManagedRow for Board {
    const TABLE: ManagedTable = ManagedTable::Boards;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.id.clone()),
            Value::Text(self.name.clone()),
            opt_text(&self.description),
            Value::Text(self.created_at.clone()),
            Value::Text(self.updated_at.clone()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    pub board_id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: i64,
    pub estimate_hours: Option<f64>,
    pub due_date: Option<String>,
    pub position: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl ManagedRow for Task {
    const TABLE: ManagedTable = ManagedTable::Tasks;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            board_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            status: row.get(4)?,
            priority: row.get(5)?,
            estimate_hours: row.get(6)?,
            due_date: row.get(7)?,
            position: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.id.clone()),
            Value::Text(self.board_id.clone()),
            Value::Text(self.title.clone()),
            opt_text(&self.description),
            Value::Text(self.status.clone()),
            Value::Integer(self.priority),
            self.estimate_hours.map_or(Value::Null, Value::Real),
            opt_text(&self.due_date),
            Value::Integer(self.position),
            Value::Text(self.created_at.clone()),
            Value::Text(self.updated_at.clone()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub id: String,
    pub task_id: Option<String>,
    pub board_id: Option<String>,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

impl ManagedRow for Note {
    const TABLE: ManagedTable = ManagedTable::Notes;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            task_id: row.get(1)?,
            board_id: row.get(2)?,
            content: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.id.clone()),
            opt_text(&self.task_id),
            opt_text(&self.board_id),
            Value::Text(self.content.clone()),
            Value::Text(self.created_at.clone()),
            Value::Text(self.updated_at.clone()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ManagedRow for Tag {
    const TABLE: ManagedTable = ManagedTable::Tags;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            color: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.id.clone()),
            Value::Text(self.name.clone()),
            opt_text(&self.color),
            Value::Text(self.created_at.clone()),
            Value::Text(self.updated_at.clone()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskTag {
    pub task_id: String,
    pub tag_id: String,
}

impl ManagedRow for TaskTag {
    const TABLE: ManagedTable = ManagedTable::TaskTags;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            task_id: row.get(0)?,
            tag_id: row.get(1)?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.task_id.clone()),
            Value::Text(self.tag_id.clone()),
        ]
    }
}
