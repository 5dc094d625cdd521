//! Dropbox content hash
//!
//! The hash is SHA-256 over the concatenated SHA-256 digests of each 4 MiB
//! block of the content, hex encoded.

use sha2::{Digest, Sha256};

/// Block size used by the Dropbox content hash
pub const BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Compute the Dropbox content hash of `data`
pub fn content_hash(data: &[u8]) -> String {
    let mut overall = Sha256::new();
    for block in data.chunks(BLOCK_SIZE) {
        overall.update(Sha256::digest(block));
    }
    hex::encode(overall.finalize())
}
