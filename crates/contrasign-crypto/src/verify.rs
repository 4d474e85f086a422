// Signature verification for Contrasign
//
// Verification is standalone: it needs only the fingerprint, the signature
// and the signer's public key, so third parties can audit offline.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use p256::ecdsa::signature::Verifier as _;
use rsa::pss::VerifyingKey as PssVerifyingKey;
use rsa::signature::Verifier;
use rsa::traits::PublicKeyParts;
use sha2::Sha256;

use crate::error::{CryptoError, Result};
use crate::hash::fingerprint_reader;
use crate::keys::PublicKey;
use crate::types::{DetachedSignature, Fingerprint, SignatureAlgorithm};

/// Verifies a signature over a fingerprint.
///
/// Returns `Ok(false)` for any signature that does not verify, including a
/// well-formed signature from the wrong key. Errors are reserved for inputs
/// that cannot be parsed: an unreadable PEM, a signature that is not the
/// expected encoding, or an algorithm that does not match the key type.
pub fn verify_fingerprint(
    fingerprint: &Fingerprint,
    signature: &[u8],
    public_key_pem: &str,
    algorithm: SignatureAlgorithm,
) -> Result<bool> {
    let public_key = PublicKey::from_pem(public_key_pem)?;
    verify_with_key(fingerprint, signature, &public_key, algorithm)
}

/// Same as [`verify_fingerprint`] with an already parsed key.
pub fn verify_with_key(
    fingerprint: &Fingerprint,
    signature: &[u8],
    public_key: &PublicKey,
    algorithm: SignatureAlgorithm,
) -> Result<bool> {
    let message = fingerprint.as_bytes();

    match (algorithm, public_key) {
        (SignatureAlgorithm::RsaPssSha256, PublicKey::Rsa(key)) => {
            // A signature made under a different modulus size cannot match this key
            if signature.len() != key.size() {
                return Ok(false);
            }
            let signature = rsa::pss::Signature::try_from(signature)
                .map_err(|e| CryptoError::MalformedInput(format!("invalid RSA signature: {}", e)))?;
            let verifying_key = PssVerifyingKey::<Sha256>::new(key.clone());
            Ok(verifying_key.verify(message, &signature).is_ok())
        }
        (SignatureAlgorithm::EcdsaSha256, PublicKey::Ecdsa(key)) => {
            let signature = p256::ecdsa::Signature::from_der(signature)
                .map_err(|e| CryptoError::MalformedInput(format!("invalid ECDSA signature: {}", e)))?;
            let verifying_key = p256::ecdsa::VerifyingKey::from(key);
            Ok(verifying_key.verify(message, &signature).is_ok())
        }
        (algorithm, key) => Err(CryptoError::MalformedInput(format!(
            "{} signature cannot be checked against a {} public key",
            algorithm,
            key.algorithm()
        ))),
    }
}

/// Verifies a base64-encoded signature.
pub fn verify_fingerprint_base64(
    fingerprint: &Fingerprint,
    signature_base64: &str,
    public_key_pem: &str,
    algorithm: SignatureAlgorithm,
) -> Result<bool> {
    let signature = BASE64_STANDARD
        .decode(signature_base64.trim())
        .map_err(|e| CryptoError::MalformedInput(format!("invalid base64 signature: {}", e)))?;
    verify_fingerprint(fingerprint, &signature, public_key_pem, algorithm)
}

/// Outcome of checking an artifact against a detached signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachedVerification {
    Valid,
    /// The artifact's fingerprint differs from the one in the document.
    HashMismatch { computed: Fingerprint },
    /// The artifact's size differs from the one in the document.
    SizeMismatch { computed: u64 },
    /// The fingerprint matches but the signature does not verify.
    BadSignature,
}

impl DetachedVerification {
    pub fn is_valid(&self) -> bool {
        matches!(self, DetachedVerification::Valid)
    }
}

/// Checks an artifact stream against a detached signature document.
///
/// The artifact is re-hashed by streaming. When `pinned_public_key_pem` is
/// given it is used instead of the key embedded in the document.
pub fn verify_detached<R: std::io::Read>(
    artifact: R,
    document: &DetachedSignature,
    pinned_public_key_pem: Option<&str>,
) -> Result<DetachedVerification> {
    if document.hash.algo != "sha-256" {
        return Err(CryptoError::MalformedInput(format!(
            "unsupported hash algorithm: '{}' (expected 'sha-256')",
            document.hash.algo
        )));
    }

    let (computed, size) = fingerprint_reader(artifact)?;
    if computed != document.hash.value {
        return Ok(DetachedVerification::HashMismatch { computed });
    }
    if size != document.artifact.size {
        return Ok(DetachedVerification::SizeMismatch { computed: size });
    }

    let public_key_pem = pinned_public_key_pem.unwrap_or(&document.public_key_pem);
    let valid = verify_fingerprint_base64(
        &computed,
        &document.signature,
        public_key_pem,
        document.algorithm,
    )?;

    Ok(if valid {
        DetachedVerification::Valid
    } else {
        DetachedVerification::BadSignature
    })
}
