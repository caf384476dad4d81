//! Fixtures shared by the backup unit tests

use std::fs;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tempfile::TempDir;

use super::context::{BackupContext, BackupPolicy};
use super::integrity::artifact_checksum;
use super::manager::filename_timestamp;
use crate::archive::{compress_buffer, encode_frame};
use crate::config::BackupLayout;
use crate::crypto::{BackupCipher, DerivedKey};
use crate::models::{BackupRecord, BackupType, NewBackup};
use crate::storage::{FileStateStore, FileTree, MemoryMetadataStore};

static SEEDED: AtomicU64 = AtomicU64::new(0);

/// Context over a temp dir holding a state store ("STATE") and an upload
/// tree with `note.txt` ("hello")
pub fn fixture() -> (TempDir, Arc<BackupContext>) {
    fixture_with(
        BackupPolicy {
            min_free_space: 0,
            ..BackupPolicy::default()
        },
        false,
    )
}

pub fn fixture_with(policy: BackupPolicy, with_key: bool) -> (TempDir, Arc<BackupContext>) {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    let uploads = dir.path().join("uploads");
    fs::create_dir_all(&data).unwrap();
    fs::create_dir_all(&uploads).unwrap();
    fs::write(data.join("contracts.db"), b"STATE").unwrap();
    fs::write(uploads.join("note.txt"), b"hello").unwrap();

    let layout = BackupLayout::new(dir.path().join("backups"));
    layout.ensure_directories().unwrap();

    let cipher = if with_key {
        BackupCipher::new(DerivedKey::from_bytes([42; 32]))
    } else {
        BackupCipher::without_key()
    };

    let ctx = BackupContext::new(
        layout,
        policy,
        Arc::new(MemoryMetadataStore::new()),
        Arc::new(FileStateStore::new(data.join("contracts.db"))),
        FileTree::new(uploads, Vec::new()),
        cipher,
    );
    (dir, Arc::new(ctx))
}

/// Write a valid artifact and record it with the given creation time
pub fn seed_backup(
    ctx: &BackupContext,
    backup_type: BackupType,
    created_at: DateTime<Utc>,
) -> BackupRecord {
    let seq = SEEDED.fetch_add(1, Ordering::SeqCst);
    let filename = format!(
        "backup-{}-{}-{:04}.gz",
        backup_type,
        filename_timestamp(created_at),
        seq
    );
    let bytes = compress_buffer(&encode_frame(b"STATE", b""), 6).unwrap();
    fs::write(ctx.layout.type_dir(backup_type).join(&filename), &bytes).unwrap();

    ctx.metadata
        .create_backup(NewBackup {
            filename,
            backup_type,
            size: bytes.len() as u64,
            iv: None,
            compressed: true,
            compression_level: 6,
            checksum: Some(artifact_checksum(&bytes)),
            created_at,
            duration_ms: 1,
        })
        .unwrap()
}
