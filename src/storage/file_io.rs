//! File I/O utilities with atomic writes
//!
//! Provides safe file operations that won't leave a half-written file behind
//! on failure: data is written to a sibling temp file, synced, then renamed.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{VaultError, VaultResult};

/// Read JSON from a file, returning a default value if file doesn't exist
pub fn read_json<T, P>(path: P) -> VaultResult<T>
where
    T: DeserializeOwned + Default,
    P: AsRef<Path>,
{
    let path = path.as_ref();

    if !path.exists() {
        return Ok(T::default());
    }

    let file = File::open(path)
        .map_err(|e| VaultError::Storage(format!("Failed to open {}: {}", path.display(), e)))?;

    let reader = BufReader::new(file);
    serde_json::from_reader(reader)
        .map_err(|e| VaultError::Storage(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Path of the temp file used while writing `path`
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

/// Write JSON to a file atomically (write to temp, then rename)
pub fn write_json_atomic<T, P>(path: P, data: &T) -> VaultResult<()>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let bytes = serde_json::to_vec_pretty(data)
        .map_err(|e| VaultError::Storage(format!("Failed to serialize data: {}", e)))?;
    write_bytes_atomic(path, &bytes)
}

/// Write bytes to a file atomically (write to temp, sync, then rename)
///
/// The temp file is removed if any step fails.
pub fn write_bytes_atomic<P: AsRef<Path>>(path: P, bytes: &[u8]) -> VaultResult<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            VaultError::Storage(format!(
                "Failed to create directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    // Temp file in the same directory so the rename stays on one filesystem
    let temp_path = partial_path(path);

    let result = write_and_sync(&temp_path, bytes).and_then(|_| fs::rename(&temp_path, path));
    if let Err(e) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(VaultError::Storage(format!(
            "Failed to write {}: {}",
            path.display(),
            e
        )));
    }

    Ok(())
}

fn write_and_sync(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(bytes)?;
    writer.flush()?;
    writer.get_ref().sync_all()
}

/// Remove a file, treating "already gone" as success
///
/// Returns whether a file was actually removed.
pub fn remove_file_if_exists<P: AsRef<Path>>(path: P) -> io::Result<bool> {
    match fs::remove_file(path.as_ref()) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
    struct TestData {
        name: String,
        value: i32,
    }

    #[test]
    fn test_read_nonexistent_returns_default() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nonexistent.json");

        let data: TestData = read_json(&path).unwrap();
        assert_eq!(data, TestData::default());
    }

    #[test]
    fn test_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.json");

        let data = TestData {
            name: "test".to_string(),
            value: 42,
        };

        write_json_atomic(&path, &data).unwrap();
        let loaded: TestData = read_json(&path).unwrap();
        assert_eq!(data, loaded);
    }

    #[test]
    fn test_atomic_write_no_temp_file_left() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("artifact.gz");

        write_bytes_atomic(&path, b"payload").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"payload");
        assert!(!partial_path(&path).exists());
        assert_eq!(
            partial_path(&path),
            temp_dir.path().join("artifact.gz.partial")
        );
    }

    #[test]
    fn test_write_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("dir").join("test.json");

        write_json_atomic(&path, &TestData::default()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_remove_file_if_exists() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("gone.bin");
        fs::write(&path, b"x").unwrap();

        assert!(remove_file_if_exists(&path).unwrap());
        assert!(!remove_file_if_exists(&path).unwrap());
    }

    #[test]
    fn test_read_invalid_json_is_storage_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.json");
        fs::write(&path, "not json at all").unwrap();

        let result: VaultResult<TestData> = read_json(&path);
        assert!(matches!(result, Err(VaultError::Storage(_))));
    }
}
