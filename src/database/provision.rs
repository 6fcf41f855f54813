//! Provisioning orchestrator
//!
//! This module drives the state machine that turns a bundled read-only
//! asset into a usable, version-stamped install file. For every managed
//! database the orchestrator classifies the install path as Absent, Stale,
//! Overversioned, or Current, then dispatches to the asset copier, the
//! schema registry, and the version accessor:
//!
//! - Absent (or unreadable): provision wholesale from the asset.
//! - Stale (`stored < expected`): replace wholesale from the asset; if the
//!   replacement fails, run the registered DDL against the existing stale
//!   file and report the Degraded outcome.
//! - Overversioned (`stored > expected`): delete the file and provision
//!   from the asset; a failure here leaves the database absent.
//! - Current (`stored == expected`): no action.
//!
//! Every transition is one-shot. There is no retry loop anywhere; callers
//! that want a retry call [`Provisioner::ensure_provisioned`] again.

use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use super::assets::AssetBundle;
use super::core::{version, DatabaseConn, SchemaRegistry};
use super::DatabaseDescriptor;
use crate::config::SeedstoreConfig;

/// Classification of an install file relative to its descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionState {
    /// No file at the install path, or the file is unreadable
    Absent,

    /// Stored version below the expected version
    Stale { stored: u32 },

    /// Stored version above the expected version
    Overversioned { stored: u32 },

    /// Stored version equals the expected version
    Current,

    /// Schema present and queryable, but version and data were not
    /// refreshed because replacement failed. Only ever produced by a
    /// fallback, never by classification.
    Degraded,
}

impl fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionState::Absent => write!(f, "absent"),
            ProvisionState::Stale { stored } => write!(f, "stale (stored v{})", stored),
            ProvisionState::Overversioned { stored } => {
                write!(f, "overversioned (stored v{})", stored)
            }
            ProvisionState::Current => write!(f, "current"),
            ProvisionState::Degraded => write!(f, "degraded"),
        }
    }
}

/// Terminal queryable outcome of a successful provisioning run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisionOutcome {
    /// Install file matches the expected version
    Current,

    /// Schema exists but version/data remain behind the expected baseline
    Degraded,
}

impl fmt::Display for ProvisionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionOutcome::Current => write!(f, "current"),
            ProvisionOutcome::Degraded => write!(f, "degraded"),
        }
    }
}

/// Errors surfaced by the provisioning orchestrator
///
/// Corrupt or unreadable version metadata is never reported here; it is
/// folded into the Absent state and re-provisioned.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The bundle carries no asset for the identifier
    #[error("asset '{identifier}' not found in bundle at '{path}'")]
    AssetNotFound { identifier: String, path: String },

    /// I/O failure while copying or deleting the install file
    #[error("i/o failure while provisioning '{identifier}'")]
    Io {
        identifier: String,
        #[source]
        source: std::io::Error,
    },

    /// The schema-registry fallback itself failed
    #[error("schema fallback failed for '{identifier}': {reason}")]
    Schema { identifier: String, reason: String },
}

/// Observer notified at each state transition and error
///
/// Decouples the engine from any concrete logging facility; the default
/// [`TracingObserver`] emits `tracing` events.
pub trait ProvisionObserver: Send + Sync {
    fn on_transition(&self, identifier: &str, state: &ProvisionState);
    fn on_error(&self, identifier: &str, error: &ProvisionError);
}

/// Default observer backed by `tracing`
pub struct TracingObserver;

impl ProvisionObserver for TracingObserver {
    fn on_transition(&self, identifier: &str, state: &ProvisionState) {
        info!("database '{}' is {}", identifier, state);
    }

    fn on_error(&self, identifier: &str, error: &ProvisionError) {
        warn!("provisioning error for '{}': {}", identifier, error);
    }
}

/// The state-machine driver
///
/// Holds no database handles of its own; the caller must release any
/// cached writable handle to the install file before invoking
/// [`Provisioner::ensure_provisioned`], to avoid file-lock conflicts with
/// the copy target.
pub struct Provisioner<'a> {
    config: &'a SeedstoreConfig,
    registry: &'a SchemaRegistry,
    observer: &'a dyn ProvisionObserver,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        config: &'a SeedstoreConfig,
        registry: &'a SchemaRegistry,
        observer: &'a dyn ProvisionObserver,
    ) -> Self {
        Self {
            config,
            registry,
            observer,
        }
    }

    /// Classify the install file without modifying anything.
    ///
    /// A missing or unreadable file (including corrupt version metadata)
    /// classifies as Absent.
    pub fn classify(&self, descriptor: &DatabaseDescriptor) -> ProvisionState {
        let path = self.config.db_path(&descriptor.identifier);
        if !path.exists() {
            return ProvisionState::Absent;
        }

        match version::read_version(&path) {
            Err(_) => ProvisionState::Absent,
            Ok(stored) if stored < descriptor.expected_version => ProvisionState::Stale { stored },
            Ok(stored) if stored > descriptor.expected_version => {
                ProvisionState::Overversioned { stored }
            }
            Ok(_) => ProvisionState::Current,
        }
    }

    /// Drive the install file to a terminal queryable state.
    ///
    /// Returns `Ok` when the file ends Current or in the documented
    /// Degraded fallback. Returns an error only when an overversioned file
    /// was deleted and could not be re-provisioned, or when the schema
    /// fallback itself fails.
    pub fn ensure_provisioned(
        &self,
        descriptor: &DatabaseDescriptor,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let identifier = descriptor.identifier.as_str();
        let path = self.config.db_path(identifier);
        let state = self.classify(descriptor);
        self.observer.on_transition(identifier, &state);

        match state {
            ProvisionState::Current => Ok(ProvisionOutcome::Current),
            // Absent provisions onto a fresh file; Stale replaces the
            // existing one wholesale. Both fall back to schema-only DDL
            // at the install path when the copy fails. A Degraded file is
            // version-stale on disk, so a re-run retries the replacement
            // the same way.
            ProvisionState::Absent | ProvisionState::Stale { .. } | ProvisionState::Degraded => {
                self.provision_with_fallback(descriptor, &path)
            }
            ProvisionState::Overversioned { .. } => {
                if let Err(source) = fs::remove_file(&path) {
                    let err = ProvisionError::Io {
                        identifier: identifier.to_string(),
                        source,
                    };
                    self.observer.on_error(identifier, &err);
                    return Err(err);
                }

                // No fallback after deletion: a failure leaves the
                // database absent and later queries fail as unavailable.
                match self.copy_from_bundle(descriptor, &path) {
                    Ok(()) => {
                        self.observer
                            .on_transition(identifier, &ProvisionState::Current);
                        Ok(ProvisionOutcome::Current)
                    }
                    Err(err) => {
                        self.observer.on_error(identifier, &err);
                        Err(err)
                    }
                }
            }
        }
    }

    /// Copy the asset to the install path and stamp it, falling back to
    /// running the registered DDL at the install path on failure.
    fn provision_with_fallback(
        &self,
        descriptor: &DatabaseDescriptor,
        path: &Path,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let identifier = descriptor.identifier.as_str();

        match self.copy_from_bundle(descriptor, path) {
            Ok(()) => {
                self.observer
                    .on_transition(identifier, &ProvisionState::Current);
                Ok(ProvisionOutcome::Current)
            }
            Err(err) => {
                self.observer.on_error(identifier, &err);
                self.schema_fallback(descriptor, path)
            }
        }
    }

    fn copy_from_bundle(
        &self,
        descriptor: &DatabaseDescriptor,
        path: &Path,
    ) -> Result<(), ProvisionError> {
        let bundle = AssetBundle::new(&self.config.asset_dir);
        if !bundle.contains(&descriptor.identifier) {
            return Err(ProvisionError::AssetNotFound {
                identifier: descriptor.identifier.clone(),
                path: bundle.asset_path(&descriptor.identifier).display().to_string(),
            });
        }

        bundle
            .provision(descriptor, path, self.config.copy_buf_size)
            .map_err(|source| ProvisionError::Io {
                identifier: descriptor.identifier.clone(),
                source,
            })
    }

    /// Run the registered DDL against the install path, creating the file
    /// if it does not exist. The version stamp is left untouched, so the
    /// result classifies as stale until a later replacement succeeds.
    fn schema_fallback(
        &self,
        descriptor: &DatabaseDescriptor,
        path: &Path,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let identifier = descriptor.identifier.as_str();

        // On a fresh install the copier normally creates the directory
        // chain; when the copy never ran, the fallback must do it.
        if let Some(parent) = path.parent() {
            if let Err(source) = fs::create_dir_all(parent) {
                let err = ProvisionError::Io {
                    identifier: identifier.to_string(),
                    source,
                };
                self.observer.on_error(identifier, &err);
                return Err(err);
            }
        }

        let result = DatabaseConn::open_path(path)
            .and_then(|db| self.registry.ensure_schema(&db.conn, identifier));

        match result {
            Ok(()) => {
                self.observer
                    .on_transition(identifier, &ProvisionState::Degraded);
                Ok(ProvisionOutcome::Degraded)
            }
            Err(e) => {
                let err = ProvisionError::Schema {
                    identifier: identifier.to_string(),
                    reason: e.to_string(),
                };
                self.observer.on_error(identifier, &err);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::query;
    use std::path::Path;
    use std::sync::Mutex;

    struct RecordingObserver {
        events: Mutex<Vec<String>>,
    }

    impl RecordingObserver {
        fn new() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
            }
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl ProvisionObserver for RecordingObserver {
        fn on_transition(&self, identifier: &str, state: &ProvisionState) {
            self.events
                .lock()
                .unwrap()
                .push(format!("{}: {}", identifier, state));
        }

        fn on_error(&self, identifier: &str, error: &ProvisionError) {
            self.events
                .lock()
                .unwrap()
                .push(format!("{}: error: {}", identifier, error));
        }
    }

    fn test_config(assets: &Path, data: &Path) -> SeedstoreConfig {
        SeedstoreConfig {
            asset_dir: assets.to_str().unwrap().to_string(),
            data_dir: data.to_str().unwrap().to_string(),
            copy_buf_size: 4096,
        }
    }

    fn write_countries_asset(assets: &Path, version: u32) {
        let db = DatabaseConn::open_path(&assets.join("paises")).unwrap();
        db.execute("CREATE TABLE paises (id INTEGER PRIMARY KEY, nombre TEXT NOT NULL)")
            .unwrap();
        db.execute("INSERT INTO paises (id, nombre) VALUES (1, 'España'), (2, 'Portugal')")
            .unwrap();
        version::write_version(&db.conn, version).unwrap();
    }

    fn write_stale_install(data: &Path, version: u32) {
        let db = DatabaseConn::open_path(&data.join("paises")).unwrap();
        db.execute("CREATE TABLE paises (id INTEGER PRIMARY KEY, nombre TEXT NOT NULL)")
            .unwrap();
        db.execute("INSERT INTO paises (id, nombre) VALUES (9, 'Atlantis')")
            .unwrap();
        version::write_version(&db.conn, version).unwrap();
    }

    #[test]
    fn test_fresh_install_provisions_current() {
        let assets = tempfile::TempDir::new().unwrap();
        let data = tempfile::TempDir::new().unwrap();
        write_countries_asset(assets.path(), 2);

        let config = test_config(assets.path(), data.path());
        let registry = SchemaRegistry::builtin();
        let provisioner = Provisioner::new(&config, &registry, &TracingObserver);
        let descriptor = DatabaseDescriptor::new("paises", 2);

        let outcome = provisioner.ensure_provisioned(&descriptor).unwrap();
        assert_eq!(outcome, ProvisionOutcome::Current);

        let path = config.db_path("paises");
        assert_eq!(version::read_version(&path).unwrap(), 2);

        let rows = query::query(&path, "SELECT nombre FROM paises ORDER BY id", []).unwrap();
        let names: Vec<_> = rows.iter().map(|r| r.get("nombre").unwrap()).collect();
        assert_eq!(names, ["España", "Portugal"]);
    }

    #[test]
    fn test_ensure_provisioned_is_idempotent() {
        let assets = tempfile::TempDir::new().unwrap();
        let data = tempfile::TempDir::new().unwrap();
        write_countries_asset(assets.path(), 2);

        let config = test_config(assets.path(), data.path());
        let registry = SchemaRegistry::builtin();
        let provisioner = Provisioner::new(&config, &registry, &TracingObserver);
        let descriptor = DatabaseDescriptor::new("paises", 2);

        let first = provisioner.ensure_provisioned(&descriptor).unwrap();
        let second = provisioner.ensure_provisioned(&descriptor).unwrap();
        assert_eq!(first, ProvisionOutcome::Current);
        assert_eq!(second, ProvisionOutcome::Current);

        let path = config.db_path("paises");
        assert_eq!(version::read_version(&path).unwrap(), 2);
        let tables = query::query(
            &path,
            "SELECT name FROM sqlite_master WHERE type='table' ORDER BY name",
            [],
        )
        .unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].get("name"), Some("paises"));
    }

    #[test]
    fn test_stale_install_is_replaced() {
        let assets = tempfile::TempDir::new().unwrap();
        let data = tempfile::TempDir::new().unwrap();
        write_countries_asset(assets.path(), 2);
        write_stale_install(data.path(), 1);

        let config = test_config(assets.path(), data.path());
        let registry = SchemaRegistry::builtin();
        let provisioner = Provisioner::new(&config, &registry, &TracingObserver);
        let descriptor = DatabaseDescriptor::new("paises", 2);

        assert_eq!(
            provisioner.classify(&descriptor),
            ProvisionState::Stale { stored: 1 }
        );

        let outcome = provisioner.ensure_provisioned(&descriptor).unwrap();
        assert_eq!(outcome, ProvisionOutcome::Current);

        let path = config.db_path("paises");
        assert_eq!(version::read_version(&path).unwrap(), 2);
        let rows = query::query(&path, "SELECT nombre FROM paises ORDER BY id", []).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("nombre"), Some("España"));
    }

    #[test]
    fn test_stale_replace_failure_degrades() {
        // No asset in the bundle: replacement fails and the stale file is
        // kept with its schema ensured.
        let assets = tempfile::TempDir::new().unwrap();
        let data = tempfile::TempDir::new().unwrap();
        write_stale_install(data.path(), 1);

        let config = test_config(assets.path(), data.path());
        let registry = SchemaRegistry::builtin();
        let provisioner = Provisioner::new(&config, &registry, &TracingObserver);
        let descriptor = DatabaseDescriptor::new("paises", 2);

        let outcome = provisioner.ensure_provisioned(&descriptor).unwrap();
        assert_eq!(outcome, ProvisionOutcome::Degraded);

        let path = config.db_path("paises");
        // Version and data remain stale, but the table is queryable.
        assert_eq!(version::read_version(&path).unwrap(), 1);
        let rows = query::query(&path, "SELECT nombre FROM paises", []).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("nombre"), Some("Atlantis"));
    }

    #[test]
    fn test_overversioned_is_deleted_and_reprovisioned() {
        let assets = tempfile::TempDir::new().unwrap();
        let data = tempfile::TempDir::new().unwrap();
        write_countries_asset(assets.path(), 2);
        write_stale_install(data.path(), 3);

        let config = test_config(assets.path(), data.path());
        let registry = SchemaRegistry::builtin();
        let provisioner = Provisioner::new(&config, &registry, &TracingObserver);
        let descriptor = DatabaseDescriptor::new("paises", 2);

        assert_eq!(
            provisioner.classify(&descriptor),
            ProvisionState::Overversioned { stored: 3 }
        );

        let outcome = provisioner.ensure_provisioned(&descriptor).unwrap();
        assert_eq!(outcome, ProvisionOutcome::Current);

        let path = config.db_path("paises");
        assert_eq!(version::read_version(&path).unwrap(), 2);
        let rows = query::query(&path, "SELECT nombre FROM paises ORDER BY id", []).unwrap();
        assert_eq!(rows[0].get("nombre"), Some("España"));
    }

    #[test]
    fn test_overversioned_without_asset_leaves_absent() {
        let assets = tempfile::TempDir::new().unwrap();
        let data = tempfile::TempDir::new().unwrap();
        write_stale_install(data.path(), 3);

        let config = test_config(assets.path(), data.path());
        let registry = SchemaRegistry::builtin();
        let provisioner = Provisioner::new(&config, &registry, &TracingObserver);
        let descriptor = DatabaseDescriptor::new("paises", 2);

        let err = provisioner.ensure_provisioned(&descriptor).unwrap_err();
        assert!(matches!(err, ProvisionError::AssetNotFound { .. }));

        // File deleted, never recreated; later queries fail.
        let path = config.db_path("paises");
        assert!(!path.exists());
        assert!(query::query(&path, "SELECT nombre FROM paises", []).is_err());
    }

    #[test]
    fn test_absent_without_asset_leaves_device_table() {
        let assets = tempfile::TempDir::new().unwrap();
        let data = tempfile::TempDir::new().unwrap();

        let config = test_config(assets.path(), data.path());
        let registry = SchemaRegistry::builtin();
        let provisioner = Provisioner::new(&config, &registry, &TracingObserver);
        let descriptor = DatabaseDescriptor::new("dispositivos", 1);

        let outcome = provisioner.ensure_provisioned(&descriptor).unwrap();
        assert_eq!(outcome, ProvisionOutcome::Degraded);

        // The device table exists with zero rows and is queryable.
        let path = config.db_path("dispositivos");
        let rows = query::query(&path, "SELECT mac FROM dispositivos", []).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_fresh_install_without_asset_or_data_dir_degrades() {
        // True fresh install: the data directory itself does not exist
        // yet and the bundle has no asset. The fallback must still leave
        // the device table present and queryable.
        let assets = tempfile::TempDir::new().unwrap();
        let root = tempfile::TempDir::new().unwrap();
        let data = root.path().join("app").join("databases");
        assert!(!data.exists());

        let config = test_config(assets.path(), &data);
        let registry = SchemaRegistry::builtin();
        let provisioner = Provisioner::new(&config, &registry, &TracingObserver);
        let descriptor = DatabaseDescriptor::new("dispositivos", 1);

        let outcome = provisioner.ensure_provisioned(&descriptor).unwrap();
        assert_eq!(outcome, ProvisionOutcome::Degraded);

        let rows = query::query(
            &config.db_path("dispositivos"),
            "SELECT mac FROM dispositivos",
            [],
        )
        .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_unreadable_file_treated_as_absent() {
        let assets = tempfile::TempDir::new().unwrap();
        let data = tempfile::TempDir::new().unwrap();
        write_countries_asset(assets.path(), 2);
        std::fs::write(data.path().join("paises"), b"corrupt header").unwrap();

        let config = test_config(assets.path(), data.path());
        let registry = SchemaRegistry::builtin();
        let provisioner = Provisioner::new(&config, &registry, &TracingObserver);
        let descriptor = DatabaseDescriptor::new("paises", 2);

        assert_eq!(provisioner.classify(&descriptor), ProvisionState::Absent);

        let outcome = provisioner.ensure_provisioned(&descriptor).unwrap();
        assert_eq!(outcome, ProvisionOutcome::Current);
        assert_eq!(
            version::read_version(&config.db_path("paises")).unwrap(),
            2
        );
    }

    #[test]
    fn test_fallback_without_schema_fails() {
        // Absent, no asset, and no registered schema: nothing to fall
        // back on.
        let assets = tempfile::TempDir::new().unwrap();
        let data = tempfile::TempDir::new().unwrap();

        let config = test_config(assets.path(), data.path());
        let registry = SchemaRegistry::new();
        let provisioner = Provisioner::new(&config, &registry, &TracingObserver);
        let descriptor = DatabaseDescriptor::new("paises", 2);

        let err = provisioner.ensure_provisioned(&descriptor).unwrap_err();
        assert!(matches!(err, ProvisionError::Schema { .. }));
    }

    #[test]
    fn test_observer_sees_transitions() {
        let assets = tempfile::TempDir::new().unwrap();
        let data = tempfile::TempDir::new().unwrap();
        write_countries_asset(assets.path(), 2);

        let config = test_config(assets.path(), data.path());
        let registry = SchemaRegistry::builtin();
        let observer = RecordingObserver::new();
        let provisioner = Provisioner::new(&config, &registry, &observer);
        let descriptor = DatabaseDescriptor::new("paises", 2);

        provisioner.ensure_provisioned(&descriptor).unwrap();

        let events = observer.events();
        assert_eq!(events, ["paises: absent", "paises: current"]);
    }

    #[test]
    fn test_observer_sees_errors_and_degradation() {
        let assets = tempfile::TempDir::new().unwrap();
        let data = tempfile::TempDir::new().unwrap();
        write_stale_install(data.path(), 1);

        let config = test_config(assets.path(), data.path());
        let registry = SchemaRegistry::builtin();
        let observer = RecordingObserver::new();
        let provisioner = Provisioner::new(&config, &registry, &observer);
        let descriptor = DatabaseDescriptor::new("paises", 2);

        provisioner.ensure_provisioned(&descriptor).unwrap();

        let events = observer.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], "paises: stale (stored v1)");
        assert!(events[1].contains("error"));
        assert_eq!(events[2], "paises: degraded");
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(format!("{}", ProvisionOutcome::Current), "current");
        assert_eq!(format!("{}", ProvisionOutcome::Degraded), "degraded");
    }

    #[test]
    fn test_current_install_is_untouched() {
        let assets = tempfile::TempDir::new().unwrap();
        let data = tempfile::TempDir::new().unwrap();
        write_countries_asset(assets.path(), 2);
        // Install at the expected version already, with local rows.
        write_stale_install(data.path(), 2);

        let config = test_config(assets.path(), data.path());
        let registry = SchemaRegistry::builtin();
        let provisioner = Provisioner::new(&config, &registry, &TracingObserver);
        let descriptor = DatabaseDescriptor::new("paises", 2);

        let outcome = provisioner.ensure_provisioned(&descriptor).unwrap();
        assert_eq!(outcome, ProvisionOutcome::Current);

        // Local data survives: no replacement happened.
        let rows = query::query(&config.db_path("paises"), "SELECT nombre FROM paises", [])
            .unwrap();
        assert_eq!(rows[0].get("nombre"), Some("Atlantis"));
    }
}
