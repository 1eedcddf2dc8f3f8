//! Content-addressed image identity.
//!
//! The digest of the raw upload bytes is the primary dedup key of the whole
//! pipeline: the same photograph uploaded twice (by anyone) must produce the
//! same name. A collision would silently merge two different receipts, so a
//! cryptographic hash is required here.

use sha2::{Digest, Sha256};

/// Derive the stable content name for an image from its raw bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(digest)
}
