//! Reference database provisioning and access
//!
//! This module owns everything around the bundled reference databases:
//! - `core`: connection wrapper, schema registry, and version stamp accessor
//! - `assets`: read-only asset bundle and the asset copier
//! - `provision`: the state-machine orchestrator
//! - `query`: short-lived read accessors with eager row materialization
//!
//! Collaborators go through [`SeedDatabase`]; they never touch the copier,
//! the registry, or the version accessor directly.

pub mod assets;
pub mod core;
pub mod provision;
pub mod query;

pub use assets::AssetBundle;
pub use core::{DatabaseConn, SchemaDefinitions, SchemaRegistry};
pub use provision::{
    ProvisionError, ProvisionObserver, ProvisionOutcome, ProvisionState, Provisioner,
    TracingObserver,
};
pub use query::Row;

use anyhow::{anyhow, Result};
use std::fmt;

use crate::config::SeedstoreConfig;

/// Logical identity of one managed database
///
/// The identifier is the stable key used for schema lookup, asset lookup,
/// and install-path derivation. The install path is always derived from
/// configuration, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseDescriptor {
    pub identifier: String,
    pub expected_version: u32,
}

impl DatabaseDescriptor {
    pub fn new(identifier: impl Into<String>, expected_version: u32) -> Self {
        Self {
            identifier: identifier.into(),
            expected_version,
        }
    }
}

/// The reference databases bundled with the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceDb {
    /// Device registry (unique MAC per row)
    Devices,
    /// Country list
    Countries,
    /// Court and judicial-district lookup
    Courts,
}

impl ReferenceDb {
    pub fn all() -> Vec<ReferenceDb> {
        vec![
            ReferenceDb::Devices,
            ReferenceDb::Countries,
            ReferenceDb::Courts,
        ]
    }

    pub fn identifier(&self) -> &'static str {
        match self {
            ReferenceDb::Devices => "dispositivos",
            ReferenceDb::Countries => "paises",
            ReferenceDb::Courts => "juzgados",
        }
    }

    pub fn expected_version(&self) -> u32 {
        match self {
            ReferenceDb::Devices => 1,
            ReferenceDb::Countries => 2,
            ReferenceDb::Courts => 1,
        }
    }

    pub fn descriptor(&self) -> DatabaseDescriptor {
        DatabaseDescriptor::new(self.identifier(), self.expected_version())
    }
}

impl fmt::Display for ReferenceDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

/// Per-descriptor database handle
///
/// `SeedDatabase` is the consumer-facing facade: it drives provisioning
/// for its descriptor and exposes the query surface afterwards. Each
/// instance exclusively owns at most one cached writable handle to its
/// install file; read queries always open a short-lived independent
/// connection. Instantiating two handles for the same identifier is not
/// supported and must be avoided by the caller.
pub struct SeedDatabase {
    descriptor: DatabaseDescriptor,
    config: SeedstoreConfig,
    registry: SchemaRegistry,
    observer: Box<dyn ProvisionObserver>,
    writer: Option<DatabaseConn>,
}

impl SeedDatabase {
    /// Create a handle with the built-in schema registry and the default
    /// tracing observer.
    pub fn new(descriptor: DatabaseDescriptor, config: SeedstoreConfig) -> Self {
        Self {
            descriptor,
            config,
            registry: SchemaRegistry::builtin(),
            observer: Box::new(TracingObserver),
            writer: None,
        }
    }

    /// Replace the schema registry
    pub fn with_registry(mut self, registry: SchemaRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the provisioning observer
    pub fn with_observer(mut self, observer: Box<dyn ProvisionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn descriptor(&self) -> &DatabaseDescriptor {
        &self.descriptor
    }

    /// Drive the install file to a terminal queryable state.
    ///
    /// Must complete successfully before any query is issued. Invoke this
    /// off any latency-sensitive execution context: every call is direct
    /// blocking file I/O.
    pub fn ensure_provisioned(&mut self) -> Result<ProvisionOutcome, ProvisionError> {
        // Release the cached writable handle so the copier never collides
        // with an open file lock on the install path.
        self.writer = None;

        let provisioner = Provisioner::new(&self.config, &self.registry, self.observer.as_ref());
        provisioner.ensure_provisioned(&self.descriptor)
    }

    /// Classify the install file without modifying it
    pub fn status(&self) -> ProvisionState {
        let provisioner = Provisioner::new(&self.config, &self.registry, self.observer.as_ref());
        provisioner.classify(&self.descriptor)
    }

    /// Execute a read query, eagerly materializing all rows.
    ///
    /// Opens and closes an independent read-only connection for the call.
    /// Fails if the database is unavailable (absent install file).
    pub fn query<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<Row>> {
        query::query(&self.config.db_path(&self.descriptor.identifier), sql, params)
    }

    /// Execute a mutating statement against the cached writable handle.
    ///
    /// Errors propagate to the caller uncaught; there is no internal
    /// recovery or retry.
    pub fn exec_sql<P: rusqlite::Params>(&mut self, sql: &str, params: P) -> Result<usize> {
        self.writer()?.execute_with_params(sql, params)
    }

    /// Safety net: run the registered DDL for this descriptor against the
    /// writable handle, creating the install file if needed.
    ///
    /// Guarantees the registered tables exist (possibly with zero rows)
    /// even when provisioning itself failed.
    pub fn ensure_schema(&mut self) -> Result<()> {
        if self.writer.is_none() {
            let path = self.config.db_path(&self.descriptor.identifier);
            self.writer = Some(DatabaseConn::open_path(&path)?);
        }
        let db = self
            .writer
            .as_ref()
            .ok_or_else(|| anyhow!("writable handle unavailable"))?;
        self.registry
            .ensure_schema(&db.conn, &self.descriptor.identifier)
    }

    /// Lazily open the single cached writable handle
    fn writer(&mut self) -> Result<&DatabaseConn> {
        if self.writer.is_none() {
            let path = self.config.db_path(&self.descriptor.identifier);
            self.writer = Some(DatabaseConn::open_path(&path)?);
        }
        self.writer
            .as_ref()
            .ok_or_else(|| anyhow!("writable handle unavailable"))
    }
}

/// Ensure the database install directory exists
pub fn ensure_data_dir(data_dir: &str) -> Result<()> {
    std::fs::create_dir_all(data_dir)
        .map_err(|e| anyhow!("Failed to create data directory '{}': {}", data_dir, e))
}
