//! Streaming content digests
//!
//! The same function digests files for manifest generation, for upload-time
//! verification and for post-download checks, so a manifest written on one
//! machine can be checked byte-for-byte on another.

use crate::error::Result;
use crate::manifest::ManifestEntry;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::trace;

/// Read size used while hashing a file
pub const DIGEST_CHUNK_SIZE: usize = 64 * 1024;

/// Size and SHA-256 digest of a file's content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    /// Content length in bytes
    pub size: u64,
    /// Lowercase hex SHA-256 of the content
    pub hash: String,
}

impl FileDigest {
    /// Check whether this digest agrees with a manifest entry on size and hash
    pub fn matches(&self, entry: &ManifestEntry) -> bool {
        self.size == entry.size && self.hash == entry.digest
    }
}

/// Digest a file's content
///
/// Reads the file in [`DIGEST_CHUNK_SIZE`] chunks and feeds each to a SHA-256
/// hasher, so memory use is constant regardless of file size. The size is the
/// number of bytes actually read, not the metadata length.
///
/// # Errors
///
/// - [`ArchiveError::Io`](crate::ArchiveError::Io) if the file cannot be opened or read
pub fn digest_file(path: &Path) -> Result<FileDigest> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; DIGEST_CHUNK_SIZE];
    let mut size = 0u64;

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
        size += bytes_read as u64;
    }

    let hash = hex::encode(hasher.finalize());
    trace!("Digested {:?}: {} bytes, {}", path, size, hash);

    Ok(FileDigest { size, hash })
}

/// Hash in-memory data with the same algorithm as [`digest_file`]
pub fn hash_data(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
