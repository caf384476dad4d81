//! Portable export containers
//!
//! Each builder takes the artifact bytes exactly as stored on disk plus an
//! optional metadata sidecar, and returns the bytes of the export file.

use std::io::{Cursor, Write};

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tar::{Builder, Header};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::compress::compress_buffer;
use crate::crypto::EncryptionAlgorithm;
use crate::error::{VaultError, VaultResult};
use crate::models::{BackupRecord, ExportFormat};

/// Name of the metadata sidecar inside zip and tar exports
pub const MANIFEST_NAME: &str = "metadata.json";

/// Envelope format version
pub const ENVELOPE_VERSION: u32 = 1;

/// Metadata document shipped alongside an exported artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportManifest {
    pub backup: BackupRecord,
    pub exported_at: DateTime<Utc>,
    pub format: ExportFormat,
    pub tool_version: String,
}

impl ExportManifest {
    pub fn new(backup: BackupRecord, format: ExportFormat, exported_at: DateTime<Utc>) -> Self {
        Self {
            backup,
            exported_at,
            format,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn to_json_bytes(&self) -> VaultResult<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| VaultError::Export(format!("Failed to serialize metadata: {}", e)))
    }
}

/// The artifact as-is, or wrapped in one gzip layer
pub fn build_raw(artifact: &[u8], level: Option<u32>) -> VaultResult<Vec<u8>> {
    match level {
        Some(level) => compress_buffer(artifact, level),
        None => Ok(artifact.to_vec()),
    }
}

/// Zip archive holding the artifact and an optional metadata sidecar
///
/// Entries are deflated at `level`; with no level, or level 0, they are
/// stored.
pub fn build_zip(
    entry_name: &str,
    artifact: &[u8],
    manifest: Option<&[u8]>,
    level: Option<u32>,
) -> VaultResult<Vec<u8>> {
    let options = match level {
        Some(level) if level > 0 => SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(i64::from(level))),
        _ => SimpleFileOptions::default().compression_method(CompressionMethod::Stored),
    }
    .unix_permissions(0o644);

    let zip_err = |e: zip::result::ZipError| VaultError::Export(format!("Failed to build zip: {}", e));
    let io_err = |e: std::io::Error| VaultError::Export(format!("Failed to write zip entry: {}", e));

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file(entry_name, options).map_err(zip_err)?;
    zip.write_all(artifact).map_err(io_err)?;
    if let Some(manifest) = manifest {
        zip.start_file(MANIFEST_NAME, options).map_err(zip_err)?;
        zip.write_all(manifest).map_err(io_err)?;
    }

    Ok(zip.finish().map_err(zip_err)?.into_inner())
}

/// Gzipped tar holding the artifact and an optional metadata sidecar
///
/// The gzip layer is always present; `level` 0 stores without compressing.
pub fn build_tar(
    entry_name: &str,
    artifact: &[u8],
    manifest: Option<&[u8]>,
    level: u32,
) -> VaultResult<Vec<u8>> {
    let mut builder = Builder::new(Vec::new());
    append_entry(&mut builder, entry_name, artifact)?;
    if let Some(manifest) = manifest {
        append_entry(&mut builder, MANIFEST_NAME, manifest)?;
    }
    let container = builder
        .into_inner()
        .map_err(|e| VaultError::Export(format!("Failed to build tar: {}", e)))?;
    compress_buffer(&container, level)
}

fn append_entry(builder: &mut Builder<Vec<u8>>, name: &str, data: &[u8]) -> VaultResult<()> {
    let mut header = Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_cksum();
    builder
        .append_data(&mut header, name, data)
        .map_err(|e| VaultError::Export(format!("Failed to add {} to tar: {}", name, e)))
}

/// Self-describing JSON wrapper around an encrypted artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    pub version: u32,
    pub algorithm: EncryptionAlgorithm,
    /// Base64 IV needed to decrypt `data`
    pub iv: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ExportManifest>,
    /// Base64 ciphertext
    pub data: String,
}

impl EncryptedEnvelope {
    pub fn new(
        ciphertext: &[u8],
        iv: String,
        algorithm: EncryptionAlgorithm,
        metadata: Option<ExportManifest>,
    ) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            algorithm,
            iv,
            metadata,
            data: STANDARD.encode(ciphertext),
        }
    }

    pub fn to_json_bytes(&self) -> VaultResult<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| VaultError::Export(format!("Failed to serialize envelope: {}", e)))
    }

    pub fn parse(bytes: &[u8]) -> VaultResult<Self> {
        let envelope: Self = serde_json::from_slice(bytes)
            .map_err(|e| VaultError::CorruptArchive(format!("Invalid envelope: {}", e)))?;
        if envelope.version != ENVELOPE_VERSION {
            return Err(VaultError::CorruptArchive(format!(
                "Unsupported envelope version {}",
                envelope.version
            )));
        }
        Ok(envelope)
    }

    /// Decode the ciphertext
    pub fn ciphertext(&self) -> VaultResult<Vec<u8>> {
        STANDARD
            .decode(&self.data)
            .map_err(|e| VaultError::CorruptArchive(format!("Invalid envelope data: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::decompress;
    use crate::models::{BackupId, BackupType, NewBackup};
    use std::io::Read;
    use tar::Archive;
    use zip::ZipArchive;

    fn record() -> BackupRecord {
        BackupRecord::from_new(
            BackupId::new(),
            NewBackup {
                filename: "backup-manual-x-0001.gz".into(),
                backup_type: BackupType::Manual,
                size: 3,
                iv: None,
                compressed: true,
                compression_level: 6,
                checksum: None,
                created_at: Utc::now(),
                duration_ms: 5,
            },
        )
    }

    fn manifest_bytes(format: ExportFormat) -> Vec<u8> {
        ExportManifest::new(record(), format, Utc::now())
            .to_json_bytes()
            .unwrap()
    }

    #[test]
    fn test_raw_passthrough_and_gzip() {
        assert_eq!(build_raw(b"abc", None).unwrap(), b"abc");
        let wrapped = build_raw(b"abc", Some(6)).unwrap();
        assert_eq!(decompress(&wrapped).unwrap(), b"abc");
    }

    #[test]
    fn test_zip_entries() {
        let artifact = vec![7u8; 4096];
        let manifest = manifest_bytes(ExportFormat::Zip);
        let bytes = build_zip("backup.gz", &artifact, Some(&manifest), Some(9)).unwrap();

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);

        let mut out = Vec::new();
        archive
            .by_name("backup.gz")
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, artifact);

        let mut meta = String::new();
        archive
            .by_name(MANIFEST_NAME)
            .unwrap()
            .read_to_string(&mut meta)
            .unwrap();
        let parsed: ExportManifest = serde_json::from_str(&meta).unwrap();
        assert_eq!(parsed.format, ExportFormat::Zip);
    }

    #[test]
    fn test_zip_level_zero_is_stored() {
        let bytes = build_zip("backup.gz", b"payload", None, Some(0)).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let entry = archive.by_index(0).unwrap();
        assert_eq!(entry.compression(), CompressionMethod::Stored);
    }

    #[test]
    fn test_tar_entries() {
        let manifest = manifest_bytes(ExportFormat::Tar);
        let bytes = build_tar("backup.gz", b"artifact", Some(&manifest), 6).unwrap();

        let container = decompress(&bytes).unwrap();
        let mut archive = Archive::new(container.as_slice());
        let mut names = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().display().to_string();
            if name == "backup.gz" {
                let mut data = Vec::new();
                entry.read_to_end(&mut data).unwrap();
                assert_eq!(data, b"artifact");
            }
            names.push(name);
        }
        assert_eq!(names, vec!["backup.gz".to_string(), MANIFEST_NAME.to_string()]);
    }

    #[test]
    fn test_envelope_round_trip() {
        let envelope = EncryptedEnvelope::new(
            b"ciphertext",
            "AAAAAAAAAAAAAAAA".into(),
            EncryptionAlgorithm::Aes256Gcm,
            Some(ExportManifest::new(record(), ExportFormat::EncryptedJson, Utc::now())),
        );
        let bytes = envelope.to_json_bytes().unwrap();

        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["algorithm"], "aes-256-gcm");
        assert_eq!(value["version"], 1);

        let parsed = EncryptedEnvelope::parse(&bytes).unwrap();
        assert_eq!(parsed.ciphertext().unwrap(), b"ciphertext");
        assert_eq!(parsed, envelope);
    }

    #[test]
    fn test_envelope_rejects_garbage() {
        assert!(matches!(
            EncryptedEnvelope::parse(b"[]"),
            Err(VaultError::CorruptArchive(_))
        ));
    }
}
