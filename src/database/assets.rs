//! Bundled asset access and the asset copier
//!
//! The asset bundle is the read-only resource package shipped with the
//! application: one named byte blob per database identifier, addressed as
//! `<asset_dir>/<identifier>`. The engine only ever reads from this
//! boundary.
//!
//! Provisioning streams an asset to the install path and then stamps the
//! destination with the descriptor's expected version. A failure mid-copy
//! leaves whatever was written at the destination in place; there is no
//! rollback of a partially written file. The orchestrator handles such
//! failures through its fallback ladder.

use rusqlite::Connection;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use super::core::version;
use super::DatabaseDescriptor;

/// Read-only named byte blobs shipped with the application
pub struct AssetBundle {
    root: PathBuf,
}

impl AssetBundle {
    /// Create a bundle rooted at `asset_dir`
    pub fn new(asset_dir: &str) -> Self {
        Self {
            root: PathBuf::from(asset_dir),
        }
    }

    /// Path of the bundled asset for an identifier
    pub fn asset_path(&self, identifier: &str) -> PathBuf {
        self.root.join(identifier)
    }

    /// Check whether the bundle carries an asset for the identifier
    pub fn contains(&self, identifier: &str) -> bool {
        self.asset_path(identifier).is_file()
    }

    /// Provision the install file at `dest` from the bundled asset.
    ///
    /// Creates the destination's parent directory chain, streams the asset
    /// with a fixed-size buffer, then reopens the destination to stamp the
    /// descriptor's expected version. Both streams are closed on every
    /// exit path. A `NotFound` error means the bundle has no asset for the
    /// descriptor.
    pub fn provision(
        &self,
        descriptor: &DatabaseDescriptor,
        dest: &Path,
        buf_size: usize,
    ) -> io::Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut src = File::open(self.asset_path(&descriptor.identifier))?;
        let mut out = File::create(dest)?;

        let mut buf = vec![0u8; buf_size];
        loop {
            let n = src.read(&mut buf)?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n])?;
        }
        out.flush()?;
        drop(src);
        drop(out);

        // Stamp the copy with the expected version so a subsequent check
        // classifies it as Current.
        let conn = Connection::open(dest).map_err(io::Error::other)?;
        version::write_version(&conn, descriptor.expected_version).map_err(io::Error::other)?;

        Ok(())
    }
}
