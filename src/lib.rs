#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! Seedstore - a provisioning and versioning engine for bundled databases
//!
//! Applications that ship small read-only reference databases (a device
//! registry, a country list, a court lookup) need a writable,
//! version-stamped copy of each on persistent storage before anything
//! queries them. Seedstore is that provisioning engine: it classifies
//! each install file as Absent, Stale, Overversioned, or Current,
//! provisions or replaces it from the bundled asset, and falls back to a
//! schema-only Degraded state when the asset cannot be used.
//!
//! # Architecture
//!
//! - **[`database`]**: the engine itself
//!   - `core`: connection wrapper, schema registry, version stamp accessor
//!   - `assets`: read-only asset bundle and the asset copier
//!   - `provision`: the state-machine orchestrator
//!   - `query`: short-lived read accessors with eager row materialization
//! - **[`config`]**: configuration and install/asset path derivation
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use seedstore::{ReferenceDb, SeedDatabase, SeedstoreConfig};
//!
//! let config = SeedstoreConfig::new(&None)?;
//! let mut countries = SeedDatabase::new(ReferenceDb::Countries.descriptor(), config);
//!
//! // Call off any latency-sensitive context: blocking file I/O.
//! countries.ensure_provisioned()?;
//!
//! for row in countries.query("SELECT nombre FROM paises ORDER BY id", [])? {
//!     println!("{}", row.get("nombre").unwrap_or(""));
//! }
//! ```
//!
//! # Concurrency model
//!
//! All operations are synchronous, blocking I/O. Each [`SeedDatabase`]
//! owns at most one cached writable handle; reads open short-lived
//! read-only connections. There is no coordination across instances
//! pointed at the same install path — callers must not create two
//! handles for the same identifier.

pub mod config;
pub mod database;

pub use config::{database_info, DatabaseInfo, SeedstoreConfig, DEFAULT_COPY_BUF_SIZE};

pub use database::{
    ensure_data_dir, AssetBundle, DatabaseConn, DatabaseDescriptor, ProvisionError,
    ProvisionObserver, ProvisionOutcome, ProvisionState, Provisioner, ReferenceDb, Row,
    SchemaDefinitions, SchemaRegistry, SeedDatabase, TracingObserver,
};
