//! Hashing System - SHA-1 for Asset Digests
//!
//! The digest is fed segment by segment while the asset is assembled, so the
//! concatenated output never has to be hashed in a second pass.

use sha1::{Digest, Sha1};

/// Compute SHA-1 hash of bytes, return hex string
pub fn sha1_hex(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Streaming digest and byte length, always advanced together.
#[derive(Debug, Clone, Default)]
pub struct RunningDigest {
    hasher: Sha1,
    length: usize,
}

impl RunningDigest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &str) {
        self.hasher.update(chunk.as_bytes());
        self.length += chunk.len();
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Hex digest of everything fed so far. Does not reset the state.
    pub fn hexdigest(&self) -> String {
        hex::encode(self.hasher.clone().finalize())
    }
}
