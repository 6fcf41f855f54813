//! Database connection management
//!
//! This module provides the core connection wrapper used by the provisioning
//! engine and the query executor.

use anyhow::{anyhow, Result};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;

/// Core database connection wrapper
///
/// `DatabaseConn` provides a thin wrapper around SQLite connections,
/// handling writable, read-only, and in-memory databases with consistent
/// configuration and error handling.
pub struct DatabaseConn {
    pub conn: Connection,
}

impl DatabaseConn {
    /// Open a writable database at the specified path, creating the file if
    /// it does not exist.
    pub fn open_path(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| anyhow!("Failed to open database at '{}': {}", path.display(), e))?;
        let db = DatabaseConn { conn };
        db.configure()?;
        Ok(db)
    }

    /// Open an existing database strictly read-only.
    ///
    /// Fails if no file exists at the path.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY).map_err(
            |e| anyhow!("Failed to open database '{}' read-only: {}", path.display(), e),
        )?;
        Ok(DatabaseConn { conn })
    }

    /// Create an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| anyhow!("Failed to create in-memory database: {}", e))?;
        let db = DatabaseConn { conn };
        db.configure()?;
        Ok(db)
    }

    /// Configure the database for the engine's use case
    fn configure(&self) -> Result<()> {
        // Journalling stays in rollback mode so a database is always a
        // single file that can be copied or deleted wholesale.
        self.conn
            .execute("PRAGMA synchronous=NORMAL", [])
            .map_err(|e| anyhow!("Failed to set synchronous mode: {}", e))?;

        self.conn
            .execute("PRAGMA temp_store=MEMORY", [])
            .map_err(|e| anyhow!("Failed to set temp store: {}", e))?;

        Ok(())
    }

    /// Execute a SQL statement
    pub fn execute(&self, sql: &str) -> Result<usize> {
        self.conn
            .execute(sql, [])
            .map_err(|e| anyhow!("Failed to execute SQL: {}", e))
    }

    /// Execute a SQL statement with parameters
    pub fn execute_with_params<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<usize> {
        self.conn
            .execute(sql, params)
            .map_err(|e| anyhow!("Failed to execute SQL with params: {}", e))
    }

    /// Check if a table exists in the database
    pub fn table_exists(&self, table_name: &str) -> Result<bool> {
        let count: i32 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                [table_name],
                |row| row.get(0),
            )
            .map_err(|e| anyhow!("Failed to check table existence: {}", e))?;
        Ok(count > 0)
    }

    /// Get the row count for a table
    pub fn table_count(&self, table_name: &str) -> Result<u64> {
        let query = format!("SELECT COUNT(*) FROM {}", table_name);
        let count: u64 = self
            .conn
            .query_row(&query, [], |row| row.get(0))
            .map_err(|e| anyhow!("Failed to get table count: {}", e))?;
        Ok(count)
    }
}
