// SHA-256 fingerprinting for Contrasign artifacts

use std::io::{ErrorKind, Read};

use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::types::Fingerprint;

/// Chunk size used when streaming artifacts from a reader.
pub const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Computes the SHA-256 hash of the input bytes and returns it as a lowercase hex string.
pub fn sha256_hex(bytes: &[u8]) -> String {
    fingerprint(bytes).to_hex()
}

/// Computes the fingerprint of an artifact held in memory.
pub fn fingerprint(bytes: &[u8]) -> Fingerprint {
    let mut hasher = FingerprintHasher::new();
    hasher.update(bytes);
    hasher.finalize().0
}

/// Streams a reader to EOF and returns its fingerprint and total size.
///
/// The reader is consumed in fixed-size chunks so large artifacts never have
/// to be resident in memory. Interrupted reads are retried; any other read
/// failure aborts hashing with [`CryptoError::Io`](crate::CryptoError::Io).
pub fn fingerprint_reader<R: Read>(mut reader: R) -> Result<(Fingerprint, u64)> {
    let mut hasher = FingerprintHasher::new();
    let mut buf = vec![0u8; READ_CHUNK_SIZE];

    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buf[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(hasher.finalize())
}

/// Incremental SHA-256 over an artifact.
///
/// A [`Fingerprint`] can only be obtained by consuming the hasher, so a
/// signature can never be requested over a partially hashed stream.
#[derive(Clone, Default)]
pub struct FingerprintHasher {
    inner: Sha256,
    len: u64,
}

impl FingerprintHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
        self.len += bytes.len() as u64;
    }

    /// Number of bytes hashed so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn finalize(self) -> (Fingerprint, u64) {
        let digest: [u8; 32] = self.inner.finalize().into();
        (Fingerprint::from_bytes(digest), self.len)
    }
}
