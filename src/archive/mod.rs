//! Archive codec
//!
//! Gzip compression, directory trees as tar containers, snapshot framing and
//! the portable containers used for export.

pub mod compress;
pub mod container;
pub mod directory;
pub mod frame;

pub use compress::{
    compress_buffer, compress_stream, compression_level, decompress, decompress_stream,
    DEFAULT_LEVEL, MAX_LEVEL,
};
pub use container::{
    build_raw, build_tar, build_zip, EncryptedEnvelope, ExportManifest, MANIFEST_NAME,
};
pub use directory::{archive_directory, compress_directory, extract_archive, DirectoryOptions};
pub use frame::{decode_frame, encode_frame, SnapshotFrame};
