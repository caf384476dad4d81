//! Uploaded contract documents, as seen by backups

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::archive::{archive_directory, extract_archive, DirectoryOptions};
use crate::backup::CancelToken;
use crate::error::{VaultError, VaultResult};

/// The upload directory tree
#[derive(Debug, Clone)]
pub struct FileTree {
    root: PathBuf,
    ignore_patterns: Vec<String>,
}

impl FileTree {
    pub fn new(root: impl Into<PathBuf>, ignore_patterns: Vec<String>) -> Self {
        Self {
            root: root.into(),
            ignore_patterns,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Tar container of the tree; empty when the directory doesn't exist
    pub fn snapshot(&self, cancel: &CancelToken) -> VaultResult<Vec<u8>> {
        if !self.root.exists() {
            debug!(root = %self.root.display(), "upload tree absent, snapshotting as empty");
            return Ok(Vec::new());
        }
        let options = DirectoryOptions::default().with_ignore_patterns(self.ignore_patterns.clone());
        archive_directory(&self.root, &options, cancel)
    }

    /// Replace the tree with the contents of a container
    ///
    /// The container is unpacked into a staging directory beside the tree,
    /// which is then swapped in. If the swap fails the previous tree is put
    /// back. An empty container restores an empty directory.
    pub fn restore(&self, bytes: &[u8]) -> VaultResult<()> {
        let (staging, previous) = self.sibling_paths()?;

        remove_dir_if_exists(&staging)?;
        let unpacked = if bytes.is_empty() {
            fs::create_dir_all(&staging).map_err(|e| io_error("create", &staging, e))
        } else {
            extract_archive(bytes, &staging)
        };
        if let Err(e) = unpacked {
            let _ = remove_dir_if_exists(&staging);
            return Err(e);
        }

        remove_dir_if_exists(&previous)?;
        let had_previous = self.root.exists();
        if had_previous {
            fs::rename(&self.root, &previous).map_err(|e| io_error("move aside", &self.root, e))?;
        }

        if let Err(e) = fs::rename(&staging, &self.root) {
            if had_previous {
                if let Err(undo) = fs::rename(&previous, &self.root) {
                    warn!(error = %undo, root = %self.root.display(), "failed to put previous upload tree back");
                }
            }
            let _ = remove_dir_if_exists(&staging);
            return Err(io_error("swap in", &self.root, e));
        }

        if had_previous {
            if let Err(e) = remove_dir_if_exists(&previous) {
                warn!(error = %e, path = %previous.display(), "failed to remove previous upload tree");
            }
        }
        Ok(())
    }

    fn sibling_paths(&self) -> VaultResult<(PathBuf, PathBuf)> {
        let parent = self.root.parent().unwrap_or_else(|| Path::new("."));
        let name = self
            .root
            .file_name()
            .ok_or_else(|| {
                VaultError::Config(format!("Invalid upload directory: {}", self.root.display()))
            })?
            .to_string_lossy();
        fs::create_dir_all(parent).map_err(|e| io_error("create", parent, e))?;
        Ok((
            parent.join(format!(".{}.staging", name)),
            parent.join(format!(".{}.previous", name)),
        ))
    }
}

fn remove_dir_if_exists(path: &Path) -> VaultResult<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_error("remove", path, e)),
    }
}

fn io_error(action: &str, path: &Path, err: io::Error) -> VaultError {
    VaultError::Io(format!("Failed to {} {}: {}", action, path.display(), err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tree_with_note(dir: &Path) -> FileTree {
        fs::create_dir_all(dir.join("leases")).unwrap();
        fs::write(dir.join("note.txt"), b"hello").unwrap();
        fs::write(dir.join("leases").join("a.pdf"), b"pdf").unwrap();
        FileTree::new(dir, vec!["*.tmp".into()])
    }

    #[test]
    fn test_absent_tree_snapshots_empty() {
        let temp_dir = TempDir::new().unwrap();
        let tree = FileTree::new(temp_dir.path().join("uploads"), Vec::new());
        assert!(tree.snapshot(&CancelToken::new()).unwrap().is_empty());
    }

    #[test]
    fn test_restore_replaces_tree() {
        let temp_dir = TempDir::new().unwrap();
        let uploads = temp_dir.path().join("uploads");
        let tree = tree_with_note(&uploads);
        let image = tree.snapshot(&CancelToken::new()).unwrap();

        fs::write(uploads.join("note.txt"), b"changed").unwrap();
        fs::write(uploads.join("extra.txt"), b"new").unwrap();

        tree.restore(&image).unwrap();
        assert_eq!(fs::read(uploads.join("note.txt")).unwrap(), b"hello");
        assert_eq!(fs::read(uploads.join("leases").join("a.pdf")).unwrap(), b"pdf");
        assert!(!uploads.join("extra.txt").exists());
        assert!(!temp_dir.path().join(".uploads.previous").exists());
        assert!(!temp_dir.path().join(".uploads.staging").exists());
    }

    #[test]
    fn test_restore_into_fresh_location() {
        let source = TempDir::new().unwrap();
        let image = tree_with_note(source.path())
            .snapshot(&CancelToken::new())
            .unwrap();

        let target = TempDir::new().unwrap();
        let restored = FileTree::new(target.path().join("uploads"), Vec::new());
        restored.restore(&image).unwrap();
        assert_eq!(
            fs::read(target.path().join("uploads").join("note.txt")).unwrap(),
            b"hello"
        );
    }

    #[test]
    fn test_empty_image_restores_empty_dir() {
        let temp_dir = TempDir::new().unwrap();
        let uploads = temp_dir.path().join("uploads");
        let tree = tree_with_note(&uploads);

        tree.restore(&[]).unwrap();
        assert!(uploads.is_dir());
        assert_eq!(fs::read_dir(&uploads).unwrap().count(), 0);
    }

    #[test]
    fn test_corrupt_image_leaves_tree_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let uploads = temp_dir.path().join("uploads");
        let tree = tree_with_note(&uploads);

        assert!(tree.restore(&[0xAB; 1024]).is_err());
        assert_eq!(fs::read(uploads.join("note.txt")).unwrap(), b"hello");
    }
}
