//! Snapshot framing
//!
//! A snapshot is the state-store bytes followed by the file-tree container,
//! with an explicit header so the split point never has to be guessed:
//!
//! ```text
//! "CVSF" | version: u8 | state_len: u64 (big-endian) | state | files
//! ```

use crate::error::{VaultError, VaultResult};

pub const MAGIC: &[u8; 4] = b"CVSF";
pub const FRAME_VERSION: u8 = 1;
pub const HEADER_LEN: usize = MAGIC.len() + 1 + 8;

/// A decoded snapshot, borrowing from the frame bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotFrame<'a> {
    pub state: &'a [u8],
    pub files: &'a [u8],
}

/// Frame state bytes and file-tree bytes into one snapshot
pub fn encode_frame(state: &[u8], files: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + state.len() + files.len());
    out.extend_from_slice(MAGIC);
    out.push(FRAME_VERSION);
    out.extend_from_slice(&(state.len() as u64).to_be_bytes());
    out.extend_from_slice(state);
    out.extend_from_slice(files);
    out
}

/// Split a snapshot back into its parts
pub fn decode_frame(bytes: &[u8]) -> VaultResult<SnapshotFrame<'_>> {
    if bytes.len() < HEADER_LEN {
        return Err(VaultError::CorruptArchive(format!(
            "Snapshot truncated: {} bytes is shorter than the header",
            bytes.len()
        )));
    }
    if &bytes[..4] != MAGIC {
        return Err(VaultError::CorruptArchive(
            "Not a snapshot: bad magic".into(),
        ));
    }
    if bytes[4] != FRAME_VERSION {
        return Err(VaultError::CorruptArchive(format!(
            "Unsupported snapshot version {}",
            bytes[4]
        )));
    }

    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&bytes[5..HEADER_LEN]);
    let body = &bytes[HEADER_LEN..];
    let state_len = usize::try_from(u64::from_be_bytes(len_bytes))
        .ok()
        .filter(|len| *len <= body.len())
        .ok_or_else(|| {
            VaultError::CorruptArchive(format!(
                "Snapshot truncated: state length exceeds {} remaining bytes",
                body.len()
            ))
        })?;

    let (state, files) = body.split_at(state_len);
    Ok(SnapshotFrame { state, files })
}
