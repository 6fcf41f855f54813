//! Query executor
//!
//! Read queries open a fresh read-only connection per call, eagerly
//! materialize every row, and close the connection before returning. No
//! live cursor ever escapes the call boundary.

use anyhow::{anyhow, Result};
use rusqlite::types::Value;
use serde::Serialize;
use std::path::Path;

use super::core::DatabaseConn;

/// A single materialized result row
///
/// Column names keep the order of the executed statement's result set;
/// every value is rendered as a string (`None` for SQL NULL).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Option<String>>,
}

impl Row {
    /// Get a value by column name
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values[i].as_deref())
    }

    /// Column names in statement order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values in statement order
    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }
}

fn render_value(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Text(s) => Some(s),
        Value::Blob(b) => Some(String::from_utf8_lossy(&b).into_owned()),
    }
}

/// Execute a read query against the database file at `path`.
///
/// Opens a short-lived read-only connection, runs the statement, and
/// collects all rows eagerly. The connection is released on every exit
/// path, including errors. Querying an empty table yields an empty vector.
pub fn query<P: rusqlite::Params>(path: &Path, sql: &str, params: P) -> Result<Vec<Row>> {
    let db = DatabaseConn::open_read_only(path)?;

    let mut stmt = db
        .conn
        .prepare(sql)
        .map_err(|e| anyhow!("Failed to prepare query: {}", e))?;

    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let column_count = columns.len();

    let mut rows = stmt
        .query(params)
        .map_err(|e| anyhow!("Failed to execute query: {}", e))?;

    let mut out = Vec::new();
    while let Some(row) = rows
        .next()
        .map_err(|e| anyhow!("Failed to read query row: {}", e))?
    {
        let mut values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            let value: Value = row
                .get(i)
                .map_err(|e| anyhow!("Failed to read column {}: {}", i, e))?;
            values.push(render_value(value));
        }
        out.push(Row {
            columns: columns.clone(),
            values,
        });
    }

    Ok(out)
}
