//! Gzip compression for buffers and streams
//!
//! Output is deterministic: the gzip header carries no timestamp or file
//! name, so identical input at the same level yields identical bytes.

use std::io::{self, Read, Write};

use flate2::read::GzDecoder;
use flate2::{Compression, GzBuilder};

use crate::error::{VaultError, VaultResult};

/// Highest accepted compression level
pub const MAX_LEVEL: u32 = 9;

/// Default compression level
pub const DEFAULT_LEVEL: u32 = 6;

/// Validate a compression level (0 = store, 9 = smallest)
pub fn compression_level(level: u32) -> VaultResult<Compression> {
    if level > MAX_LEVEL {
        return Err(VaultError::Config(format!(
            "Compression level must be between 0 and {}, got {}",
            MAX_LEVEL, level
        )));
    }
    Ok(Compression::new(level))
}

/// Gzip a byte buffer
pub fn compress_buffer(bytes: &[u8], level: u32) -> VaultResult<Vec<u8>> {
    compress_stream(bytes, Vec::with_capacity(bytes.len() / 2 + 64), level)
}

/// Gunzip a byte buffer
pub fn decompress(bytes: &[u8]) -> VaultResult<Vec<u8>> {
    let mut out = Vec::with_capacity(bytes.len().saturating_mul(2));
    GzDecoder::new(bytes)
        .read_to_end(&mut out)
        .map_err(|e| VaultError::CorruptArchive(format!("Failed to decompress: {}", e)))?;
    Ok(out)
}

/// Gzip everything from `reader` into `writer`, returning the writer
pub fn compress_stream<R: Read, W: Write>(mut reader: R, writer: W, level: u32) -> VaultResult<W> {
    let level = compression_level(level)?;
    let mut encoder = GzBuilder::new().mtime(0).write(writer, level);
    io::copy(&mut reader, &mut encoder)
        .map_err(|e| VaultError::Io(format!("Failed to compress stream: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| VaultError::Io(format!("Failed to finish compressed stream: {}", e)))
}

/// Gunzip everything from `reader` into `writer`, returning the writer
pub fn decompress_stream<R: Read, W: Write>(reader: R, mut writer: W) -> VaultResult<W> {
    let mut decoder = GzDecoder::new(reader);
    io::copy(&mut decoder, &mut writer).map_err(|e| match e.kind() {
        io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
            VaultError::CorruptArchive(format!("Failed to decompress stream: {}", e))
        }
        _ => VaultError::Io(format!("Failed to decompress stream: {}", e)),
    })?;
    Ok(writer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        b"contract vault ".iter().cycle().take(10_000).copied().collect()
    }

    #[test]
    fn test_round_trip() {
        let data = sample();
        let compressed = compress_buffer(&data, 6).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn test_round_trip_empty() {
        let compressed = compress_buffer(b"", 6).unwrap();
        assert!(decompress(&compressed).unwrap().is_empty());
    }

    #[test]
    fn test_deterministic() {
        let data = sample();
        assert_eq!(
            compress_buffer(&data, 9).unwrap(),
            compress_buffer(&data, 9).unwrap()
        );
    }

    #[test]
    fn test_level_zero_still_gzip() {
        let data = sample();
        let stored = compress_buffer(&data, 0).unwrap();
        assert!(stored.len() > data.len());
        assert_eq!(decompress(&stored).unwrap(), data);
    }

    #[test]
    fn test_invalid_level() {
        assert!(matches!(
            compress_buffer(b"x", 10),
            Err(VaultError::Config(_))
        ));
    }

    #[test]
    fn test_garbage_is_corrupt_archive() {
        assert!(matches!(
            decompress(b"definitely not gzip"),
            Err(VaultError::CorruptArchive(_))
        ));
    }

    #[test]
    fn test_stream_round_trip() {
        let data = sample();
        let compressed = compress_stream(data.as_slice(), Vec::new(), 3).unwrap();
        let restored = decompress_stream(compressed.as_slice(), Vec::new()).unwrap();
        assert_eq!(restored, data);
    }
}
