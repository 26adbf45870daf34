//! Fixed-size chunking and checksums
//!
//! Files are cut into equal plaintext chunks (the last one may be shorter).
//! Checksums are SHA-256 over the *encrypted* chunk, hex encoded, so they can
//! be verified by anyone holding the blob without the data key.

use bytes::Bytes;
use sha2::{Digest, Sha256};

/// Number of chunks for a file of `size` bytes: `ceil(size / chunk_size)`.
///
/// An empty file has zero chunks.
pub fn chunk_count(size: u64, chunk_size: usize) -> u32 {
    if size == 0 || chunk_size == 0 {
        return 0;
    }
    size.div_ceil(chunk_size as u64) as u32
}

/// Split data into chunks of `chunk_size` bytes without copying.
pub fn split_into_chunks(data: &Bytes, chunk_size: usize) -> Vec<Bytes> {
    if chunk_size == 0 {
        return Vec::new();
    }
    let mut chunks = Vec::with_capacity(chunk_count(data.len() as u64, chunk_size) as usize);
    let mut offset = 0;
    while offset < data.len() {
        let end = (offset + chunk_size).min(data.len());
        chunks.push(data.slice(offset..end));
        offset = end;
    }
    chunks
}

/// Lowercase hex SHA-256 of `data`.
pub fn checksum_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Check `data` against a stored checksum (case-insensitive hex).
pub fn verify_checksum(data: &[u8], expected: &str) -> bool {
    checksum_hex(data).eq_ignore_ascii_case(expected)
}
