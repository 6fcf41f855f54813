//! Configuration management
//!
//! `SeedstoreConfig` carries the explicit knobs the engine needs: where
//! the bundled assets live, where the writable install copies go, and the
//! copy buffer size. Configuration is loaded from a TOML file with
//! environment-variable overrides, and owns install/asset path derivation
//! for a database identifier.

use anyhow::{anyhow, Result};
use config::Config;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default size of the fixed buffer used by the asset copier
pub const DEFAULT_COPY_BUF_SIZE: usize = 8192;

#[derive(Debug, Clone)]
pub struct SeedstoreConfig {
    /// Root of the read-only asset bundle shipped with the application
    pub asset_dir: String,

    /// Per-application directory holding the writable install copies
    pub data_dir: String,

    /// Fixed buffer size for the asset copy loop
    pub copy_buf_size: usize,
}

const EMPTY_CONFIG: &str = r#"### seedstore configuration file

### root directory of the bundled read-only assets
# asset_dir = "~/.seedstore/assets"

### directory for the writable database copies
# data_dir = "~/.seedstore/databases"

### buffer size for asset copies, in bytes
# copy_buf_size = 8192
"#;

impl Default for SeedstoreConfig {
    fn default() -> Self {
        let home_dir = dirs::home_dir()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|| ".".to_string());

        Self {
            asset_dir: format!("{}/.seedstore/assets", home_dir),
            data_dir: format!("{}/.seedstore/databases", home_dir),
            copy_buf_size: DEFAULT_COPY_BUF_SIZE,
        }
    }
}

impl SeedstoreConfig {
    /// Create and initialize a configuration
    ///
    /// Reads `{path}` if given, otherwise `~/.seedstore/seedstore.toml`
    /// (created with commented defaults if missing). Environment variables
    /// prefixed with `SEEDSTORE` override file settings, e.g.
    /// `SEEDSTORE_DATA_DIR=/tmp/dbs`.
    pub fn new(path: &Option<String>) -> Result<SeedstoreConfig> {
        let mut builder = Config::builder();

        let home_dir = dirs::home_dir()
            .ok_or_else(|| anyhow!("Could not find home directory"))?
            .to_str()
            .ok_or_else(|| anyhow!("Could not convert home directory path to string"))?
            .to_owned();

        let seedstore_dir = format!("{}/.seedstore", home_dir.as_str());

        match path {
            Some(p) => {
                let path = Path::new(p.as_str());
                if path.exists() {
                    let path_str = path
                        .to_str()
                        .ok_or_else(|| anyhow!("Could not convert path to string"))?;
                    builder = builder.add_source(config::File::with_name(path_str));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG)
                        .map_err(|e| anyhow!("Unable to create config file: {}", e))?;
                }
            }
            None => {
                std::fs::create_dir_all(seedstore_dir.as_str())
                    .map_err(|e| anyhow!("Unable to create seedstore directory: {}", e))?;
                let p = format!("{}/seedstore.toml", seedstore_dir.as_str());
                if Path::new(p.as_str()).exists() {
                    builder = builder.add_source(config::File::with_name(p.as_str()));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG).map_err(|e| {
                        anyhow!("Unable to create config file {}: {}", p.as_str(), e)
                    })?;
                }
            }
        }

        builder = builder.add_source(config::Environment::with_prefix("SEEDSTORE"));

        let settings = builder
            .build()
            .map_err(|e| anyhow!("Failed to build configuration: {}", e))?;

        let settings = settings
            .try_deserialize::<HashMap<String, String>>()
            .map_err(|e| anyhow!("Failed to deserialize configuration: {}", e))?;

        let defaults = SeedstoreConfig::default();

        let asset_dir = settings
            .get("asset_dir")
            .cloned()
            .unwrap_or(defaults.asset_dir);

        let data_dir = settings
            .get("data_dir")
            .cloned()
            .unwrap_or(defaults.data_dir);

        let copy_buf_size = settings
            .get("copy_buf_size")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_COPY_BUF_SIZE);

        Ok(SeedstoreConfig {
            asset_dir,
            data_dir,
            copy_buf_size,
        })
    }

    /// Install path for a database identifier: `<data_dir>/<identifier>`
    pub fn db_path(&self, identifier: &str) -> PathBuf {
        PathBuf::from(self.data_dir.trim_end_matches('/')).join(identifier)
    }

    /// Bundled asset path for an identifier: `<asset_dir>/<identifier>`
    pub fn asset_path(&self, identifier: &str) -> PathBuf {
        PathBuf::from(self.asset_dir.trim_end_matches('/')).join(identifier)
    }

    /// Display configuration summary
    pub fn summary(&self) -> String {
        [
            format!("Asset Directory:    {}", self.asset_dir),
            format!("Data Directory:     {}", self.data_dir),
            format!("Copy Buffer Size:   {} bytes", self.copy_buf_size),
        ]
        .join("\n")
    }
}

/// Information about one managed database file
#[derive(Debug, Serialize, Clone)]
pub struct DatabaseInfo {
    pub identifier: String,
    pub path: String,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_version: Option<u32>,
    pub expected_version: u32,
}

/// Inspect the install file for a descriptor without modifying it
pub fn database_info(
    config: &SeedstoreConfig,
    descriptor: &crate::database::DatabaseDescriptor,
) -> DatabaseInfo {
    let path = config.db_path(&descriptor.identifier);
    let exists = path.is_file();
    let size_bytes = if exists {
        std::fs::metadata(&path).ok().map(|m| m.len())
    } else {
        None
    };
    let stored_version = if exists {
        crate::database::core::version::read_version(&path).ok()
    } else {
        None
    };

    DatabaseInfo {
        identifier: descriptor.identifier.clone(),
        path: path.display().to_string(),
        exists,
        size_bytes,
        stored_version,
        expected_version: descriptor.expected_version,
    }
}
