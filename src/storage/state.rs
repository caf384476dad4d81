//! The application's structured data store, as seen by backups
//!
//! Backups treat the state store as an opaque blob: `snapshot` produces a
//! consistent byte image and `restore` replaces the store with one.

use std::fs;
use std::path::{Path, PathBuf};

use super::file_io::write_bytes_atomic;
use crate::error::{VaultError, VaultResult};

/// Source and sink for state-store snapshots
pub trait StateStore: Send + Sync {
    /// Consistent byte image of the store
    fn snapshot(&self) -> VaultResult<Vec<u8>>;

    /// Replace the store's contents with a previous snapshot
    fn restore(&self, bytes: &[u8]) -> VaultResult<()>;

    /// Human-readable location, for logs
    fn describe(&self) -> String;
}

/// State store kept in a single file
///
/// Restore stages the new image next to the file and renames it over the
/// original, so readers see either the old store or the new one.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStateStore {
    fn snapshot(&self) -> VaultResult<Vec<u8>> {
        fs::read(&self.path).map_err(|e| {
            VaultError::Snapshot(format!(
                "Failed to read state store {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn restore(&self, bytes: &[u8]) -> VaultResult<()> {
        write_bytes_atomic(&self.path, bytes)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
