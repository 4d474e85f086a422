//! Error taxonomy for the signing core.

use thiserror::Error;

/// Errors produced by hashing, key protection, signing and verification.
///
/// None of the variants carry key material. `Decryption` deliberately has no
/// payload: a wrong password and a corrupted blob are indistinguishable.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("failed to read artifact bytes: {0}")]
    Io(#[from] std::io::Error),

    #[error("incorrect password")]
    Decryption,

    #[error("unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("key generation failed: {0}")]
    KeyGeneration(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
