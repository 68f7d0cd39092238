//! Blake2b-256 digests.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

type Blake2b256 = Blake2b<U32>;

/// Compute a 256-bit Blake2b hash of arbitrary data.
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash several byte slices in sequence without concatenating them.
pub fn blake2b_256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Incremental digest over the transaction bytes of a block payload.
#[derive(Clone, Default)]
pub struct PayloadHasher {
    inner: Blake2b256,
    length: usize,
}

impl PayloadHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.length += bytes.len();
        self.inner.update(bytes);
    }

    /// Bytes fed in so far.
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn finalize(self) -> [u8; 32] {
        self.inner.finalize().into()
    }
}
