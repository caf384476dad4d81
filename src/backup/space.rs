//! Free-space accounting for the backup volume

use std::path::{Path, PathBuf};

use serde::Serialize;
use sysinfo::Disks;
use tracing::warn;

use crate::error::{VaultError, VaultResult};

/// Capacity of the volume holding a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskSpace {
    pub total: u64,
    pub available: u64,
}

/// Storage summary for the backup tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceInfo {
    /// Volume size in bytes (0 if the volume couldn't be identified)
    pub total: u64,
    /// Free bytes on the volume
    pub free: u64,
    /// Bytes used by recorded backups
    pub used: u64,
    /// Number of recorded backups
    pub count: usize,
    /// Configured free-space floor
    pub min_required: u64,
}

/// Look up the volume holding `path`
///
/// Picks the disk with the longest mount point that prefixes the path, so
/// `/home` wins over `/` for a backup under `/home`.
pub fn disk_space(path: &Path) -> Option<DiskSpace> {
    let target = existing_ancestor(path);
    let target = target.canonicalize().unwrap_or(target);

    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|disk| target.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| DiskSpace {
            total: disk.total_space(),
            available: disk.available_space(),
        })
}

// canonicalize needs an existing path; walk up to the first one that is
fn existing_ancestor(path: &Path) -> PathBuf {
    path.ancestors()
        .find(|p| p.exists())
        .unwrap_or(path)
        .to_path_buf()
}

/// Fail if writing `write_len` bytes would leave less than `min_free`
pub fn check_capacity(available: u64, write_len: u64, min_free: u64) -> VaultResult<()> {
    let required = write_len.saturating_add(min_free);
    if available < required {
        return Err(VaultError::StorageFull {
            available,
            required,
        });
    }
    Ok(())
}

/// Check the volume holding `path` before writing `write_len` bytes
///
/// When the volume can't be identified the write is allowed and a warning
/// logged.
pub fn ensure_capacity(path: &Path, write_len: u64, min_free: u64) -> VaultResult<()> {
    match disk_space(path) {
        Some(space) => check_capacity(space.available, write_len, min_free),
        None => {
            warn!(path = %path.display(), "could not determine free space, skipping check");
            Ok(())
        }
    }
}
