//! Directory trees as tar containers
//!
//! The whole container is built in memory. That bounds the upload tree a
//! single backup can hold to what fits in RAM; the streaming primitives in
//! [`super::compress`] are there for callers that need more.

use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tar::{Archive, Builder, HeaderMode};
use tracing::debug;
use walkdir::WalkDir;

use super::compress::{compress_buffer, DEFAULT_LEVEL};
use crate::backup::CancelToken;
use crate::error::{VaultError, VaultResult};

/// Options for archiving a directory
#[derive(Debug, Clone)]
pub struct DirectoryOptions {
    /// Gzip level used by [`compress_directory`]
    pub level: u32,
    /// Glob patterns (case-insensitive) for entries to skip
    pub ignore_patterns: Vec<String>,
    /// Prefix every entry with this directory name
    pub include_base_dir: Option<String>,
}

impl Default for DirectoryOptions {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL,
            ignore_patterns: Vec::new(),
            include_base_dir: None,
        }
    }
}

impl DirectoryOptions {
    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }
}

fn build_ignore_set(patterns: &[String]) -> VaultResult<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| {
                VaultError::Config(format!("Invalid ignore pattern '{}': {}", pattern, e))
            })?;
        builder.add(glob);
    }

    builder
        .build()
        .map(Some)
        .map_err(|e| VaultError::Config(format!("Invalid ignore patterns: {}", e)))
}

// Matched against the path relative to the archived root and the bare name
fn is_ignored(set: &GlobSet, relative: &Path) -> bool {
    set.is_match(relative) || relative.file_name().map_or(false, |n| set.is_match(n))
}

/// Archive a directory into an uncompressed tar container
///
/// Entries are visited in sorted order and written with deterministic
/// headers. A directory matching an ignore pattern is skipped along with
/// everything under it.
pub fn archive_directory(
    dir: &Path,
    options: &DirectoryOptions,
    cancel: &CancelToken,
) -> VaultResult<Vec<u8>> {
    if !dir.is_dir() {
        return Err(VaultError::Snapshot(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    let ignore = build_ignore_set(&options.ignore_patterns)?;
    let prefix = options
        .include_base_dir
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_default();

    let mut builder = Builder::new(Vec::new());
    builder.mode(HeaderMode::Deterministic);
    builder.follow_symlinks(false);

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| match (&ignore, entry.path().strip_prefix(dir)) {
            (Some(set), Ok(relative)) => !is_ignored(set, relative),
            _ => true,
        });

    let mut count = 0usize;
    for entry in walker {
        cancel.check("directory walk")?;

        let entry = entry.map_err(|e| {
            VaultError::Snapshot(format!("Failed to walk {}: {}", dir.display(), e))
        })?;
        let relative = entry.path().strip_prefix(dir).map_err(|e| {
            VaultError::Snapshot(format!("Unexpected path {}: {}", entry.path().display(), e))
        })?;
        let name = prefix.join(relative);

        let file_type = entry.file_type();
        let result = if file_type.is_dir() {
            builder.append_dir(&name, entry.path())
        } else if file_type.is_file() || file_type.is_symlink() {
            builder.append_path_with_name(entry.path(), &name)
        } else {
            debug!(path = %entry.path().display(), "skipping special file");
            continue;
        };
        result.map_err(|e| {
            VaultError::Snapshot(format!("Failed to archive {}: {}", entry.path().display(), e))
        })?;
        count += 1;
    }

    let bytes = builder
        .into_inner()
        .map_err(|e| VaultError::Snapshot(format!("Failed to finish archive: {}", e)))?;
    debug!(dir = %dir.display(), entries = count, bytes = bytes.len(), "archived directory");
    Ok(bytes)
}

/// Archive a directory and gzip the container at `options.level`
pub fn compress_directory(
    dir: &Path,
    options: &DirectoryOptions,
    cancel: &CancelToken,
) -> VaultResult<Vec<u8>> {
    let container = archive_directory(dir, options, cancel)?;
    cancel.check("compression")?;
    compress_buffer(&container, options.level)
}

/// Unpack a tar container into `dest`
///
/// Entries whose path would land outside `dest` are rejected.
pub fn extract_archive(bytes: &[u8], dest: &Path) -> VaultResult<()> {
    std::fs::create_dir_all(dest)
        .map_err(|e| VaultError::Io(format!("Failed to create {}: {}", dest.display(), e)))?;

    let mut archive = Archive::new(bytes);
    let entries = archive
        .entries()
        .map_err(|e| VaultError::CorruptArchive(format!("Failed to read archive: {}", e)))?;

    for entry in entries {
        let mut entry = entry
            .map_err(|e| VaultError::CorruptArchive(format!("Failed to read entry: {}", e)))?;
        let path = entry
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "<invalid path>".into());

        let unpacked = entry.unpack_in(dest).map_err(|e| {
            VaultError::Io(format!("Failed to extract {}: {}", path, e))
        })?;
        if !unpacked {
            return Err(VaultError::CorruptArchive(format!(
                "Archive entry {} escapes the destination",
                path
            )));
        }
    }

    Ok(())
}
