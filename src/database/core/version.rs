//! Version stamp accessor
//!
//! Each managed database carries a single integer version stamp in the
//! SQLite file header (`PRAGMA user_version`). The provisioning engine
//! compares the stored stamp against a descriptor's expected version to
//! decide whether the installed file is usable.

use anyhow::{anyhow, Result};
use rusqlite::Connection;
use std::path::Path;

use super::connection::DatabaseConn;

/// Read the version stamp of the database file at `path`.
///
/// Opens the file read-only. Any failure (missing file, not a SQLite
/// database, truncated header) is reported as an error; the orchestrator
/// folds such errors into the Absent state rather than propagating them.
pub fn read_version(path: &Path) -> Result<u32> {
    let db = DatabaseConn::open_read_only(path)?;
    let version: u32 = db
        .conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| {
            anyhow!(
                "Failed to read version stamp from '{}': {}",
                path.display(),
                e
            )
        })?;
    Ok(version)
}

/// Stamp `version` into the database open on `conn`.
///
/// Requires a writable connection; stamping through a read-only handle
/// fails.
pub fn write_version(conn: &Connection, version: u32) -> Result<()> {
    conn.pragma_update(None, "user_version", version)
        .map_err(|e| anyhow!("Failed to write version stamp {}: {}", version, e))
}
