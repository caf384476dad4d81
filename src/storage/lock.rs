//! Advisory file locks
//!
//! Backup creation, export and purge for a backup type are serialised with an
//! exclusive `flock` on `{root}/locks/{type}.lock`. Every such operation also
//! holds a shared lock on `{root}/locks/global.lock`; restore takes that one
//! exclusively, which waits out everything else.
//!
//! Locks are per open file description, so two handles in the same process
//! exclude each other just like two processes do. Lock files are never
//! deleted: removing a file another process is blocked on would let a third
//! process lock a fresh inode and run concurrently.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{VaultError, VaultResult};
use crate::models::BackupType;

/// Kind of advisory lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// A held advisory lock, released on drop
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    file: File,
}

impl FileLock {
    /// Acquire a lock, blocking until it is available
    pub fn acquire(path: &Path, mode: LockMode) -> VaultResult<Self> {
        let file = open_lock_file(path)?;
        flock(&file, mode, true).map_err(|e| lock_error(path, e))?;
        debug!(path = %path.display(), ?mode, "acquired lock");
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Try to acquire a lock without blocking
    ///
    /// Returns `Ok(None)` if another holder has it.
    pub fn try_acquire(path: &Path, mode: LockMode) -> VaultResult<Option<Self>> {
        let file = open_lock_file(path)?;
        if !flock(&file, mode, false).map_err(|e| lock_error(path, e))? {
            return Ok(None);
        }
        Ok(Some(Self {
            path: path.to_path_buf(),
            file,
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Closing the descriptor releases the lock; unlock explicitly anyway
        // so the release doesn't depend on when the File is dropped.
        let _ = unlock(&self.file);
        debug!(path = %self.path.display(), "released lock");
    }
}

fn open_lock_file(path: &Path) -> VaultResult<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| lock_error(parent, e))?;
    }
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| lock_error(path, e))
}

fn lock_error(path: &Path, err: io::Error) -> VaultError {
    VaultError::Lock(format!("{}: {}", path.display(), err))
}

#[cfg(unix)]
fn flock(file: &File, mode: LockMode, blocking: bool) -> io::Result<bool> {
    use nix::errno::Errno;
    use nix::fcntl::{flock, FlockArg};
    use std::os::unix::io::AsRawFd;

    let arg = match (mode, blocking) {
        (LockMode::Shared, true) => FlockArg::LockShared,
        (LockMode::Shared, false) => FlockArg::LockSharedNonblock,
        (LockMode::Exclusive, true) => FlockArg::LockExclusive,
        (LockMode::Exclusive, false) => FlockArg::LockExclusiveNonblock,
    };

    loop {
        match flock(file.as_raw_fd(), arg) {
            Ok(()) => return Ok(true),
            Err(Errno::EINTR) => continue,
            Err(Errno::EWOULDBLOCK) if !blocking => return Ok(false),
            Err(e) => return Err(io::Error::from(e)),
        }
    }
}

#[cfg(unix)]
fn unlock(file: &File) -> io::Result<()> {
    use nix::fcntl::{flock, FlockArg};
    use std::os::unix::io::AsRawFd;

    flock(file.as_raw_fd(), FlockArg::Unlock).map_err(io::Error::from)
}

// No advisory locking on this platform; callers still get the in-order
// acquisition but no cross-process exclusion.
#[cfg(not(unix))]
fn flock(_file: &File, _mode: LockMode, _blocking: bool) -> io::Result<bool> {
    Ok(true)
}

#[cfg(not(unix))]
fn unlock(_file: &File) -> io::Result<()> {
    Ok(())
}

/// Locks held for the duration of one operation
#[derive(Debug)]
pub struct OperationLock {
    // Held for their Drop; released in acquisition order
    _locks: Vec<FileLock>,
}

/// Hands out the per-type and system-wide locks for a backup tree
#[derive(Debug, Clone)]
pub struct LockManager {
    dir: PathBuf,
}

impl LockManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn global_path(&self) -> PathBuf {
        self.dir.join("global.lock")
    }

    fn type_path(&self, backup_type: BackupType) -> PathBuf {
        self.dir.join(format!("{}.lock", backup_type.as_str()))
    }

    /// Lock one or more backup types for create, export, delete or purge
    ///
    /// Types are always locked in the same order so two multi-type
    /// operations can't deadlock.
    pub fn lock_types(&self, types: &[BackupType]) -> VaultResult<OperationLock> {
        let mut ordered = types.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut locks = Vec::with_capacity(ordered.len() + 1);
        locks.push(FileLock::acquire(&self.global_path(), LockMode::Shared)?);
        for backup_type in ordered {
            locks.push(FileLock::acquire(
                &self.type_path(backup_type),
                LockMode::Exclusive,
            )?);
        }
        Ok(OperationLock { _locks: locks })
    }

    /// Lock the whole backup tree, used by restore
    pub fn lock_system(&self) -> VaultResult<OperationLock> {
        let lock = FileLock::acquire(&self.global_path(), LockMode::Exclusive)?;
        Ok(OperationLock {
            _locks: vec![lock],
        })
    }
}
