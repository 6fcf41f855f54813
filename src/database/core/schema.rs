//! Database schema registry
//!
//! This module maps each database identifier to the ordered DDL that
//! creates its tables. All statements are `CREATE ... IF NOT EXISTS`
//! style so that re-running a definition against an already-correct
//! schema is safe.
//!
//! The registry is open for extension: hosts can register additional
//! identifiers without touching the provisioning orchestrator.

use anyhow::{anyhow, Result};
use rusqlite::Connection;
use std::collections::HashMap;

/// Schema definitions for the bundled reference databases
pub struct SchemaDefinitions;

impl SchemaDefinitions {
    /// Device registry: auto-incrementing primary key plus a uniquely
    /// constrained MAC address column.
    pub const DEVICES_TABLE: &'static str = r#"
        CREATE TABLE IF NOT EXISTS dispositivos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            mac TEXT NOT NULL UNIQUE,
            nombre TEXT
        );
    "#;

    /// Country list: plain lookup table.
    pub const COUNTRIES_TABLE: &'static str = r#"
        CREATE TABLE IF NOT EXISTS paises (
            id INTEGER PRIMARY KEY,
            nombre TEXT NOT NULL
        );
    "#;

    /// Judicial districts: primary entity table of the court lookup set.
    pub const COURT_DISTRICTS_TABLE: &'static str = r#"
        CREATE TABLE IF NOT EXISTS partidos (
            id INTEGER PRIMARY KEY,
            nombre TEXT NOT NULL
        );
    "#;

    /// Courts: many rows per district, referencing the district by name
    /// rather than by foreign key.
    pub const COURTS_TABLE: &'static str = r#"
        CREATE TABLE IF NOT EXISTS juzgados (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            nombre TEXT NOT NULL,
            partido TEXT NOT NULL
        );
    "#;
}

/// Registry mapping database identifiers to their DDL sequences
pub struct SchemaRegistry {
    definitions: HashMap<String, Vec<String>>,
}

impl SchemaRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            definitions: HashMap::new(),
        }
    }

    /// Create a registry pre-populated with the three bundled reference
    /// databases.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(
            "dispositivos",
            vec![SchemaDefinitions::DEVICES_TABLE.to_string()],
        );
        registry.register(
            "paises",
            vec![SchemaDefinitions::COUNTRIES_TABLE.to_string()],
        );
        registry.register(
            "juzgados",
            vec![
                SchemaDefinitions::COURT_DISTRICTS_TABLE.to_string(),
                SchemaDefinitions::COURTS_TABLE.to_string(),
            ],
        );
        registry
    }

    /// Register (or replace) the DDL sequence for an identifier
    pub fn register(&mut self, identifier: &str, ddl: Vec<String>) {
        self.definitions.insert(identifier.to_string(), ddl);
    }

    /// Check whether a schema is registered for the identifier
    pub fn contains(&self, identifier: &str) -> bool {
        self.definitions.contains_key(identifier)
    }

    /// Get the registered DDL sequence for an identifier
    pub fn ddl(&self, identifier: &str) -> Option<&[String]> {
        self.definitions.get(identifier).map(|v| v.as_slice())
    }

    /// Execute the registered DDL sequence for `identifier` against `conn`.
    ///
    /// Statements are idempotent, so repeated invocation against the same
    /// database is safe. Fails if no schema is registered for the
    /// identifier.
    pub fn ensure_schema(&self, conn: &Connection, identifier: &str) -> Result<()> {
        let ddl = self
            .ddl(identifier)
            .ok_or_else(|| anyhow!("No schema registered for '{}'", identifier))?;

        for statement in ddl {
            conn.execute(statement, []).map_err(|e| {
                anyhow!(
                    "Failed to execute schema statement for '{}': {}",
                    identifier,
                    e
                )
            })?;
        }

        Ok(())
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
