// Fingerprint signing for Contrasign
//
// The signed message is always the 32 raw bytes of the fingerprint. Both
// schemes hash that message once more with SHA-256 internally.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use p256::ecdsa::signature::Signer as _;
use rand_core::OsRng;
use rsa::pss::BlindedSigningKey;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use sha2::Sha256;

use crate::error::{CryptoError, Result};
use crate::keys::PrivateKey;
use crate::types::{Fingerprint, SignatureAlgorithm};

/// Signs a fingerprint and returns the raw signature bytes.
///
/// RSA-PSS output is randomized: signing the same fingerprint twice yields
/// different bytes, both of which verify. ECDSA uses RFC 6979 deterministic
/// nonces, so nonce reuse across distinct fingerprints cannot happen.
///
/// Fails with [`CryptoError::UnsupportedAlgorithm`] when the algorithm does
/// not match the kind of key supplied.
pub fn sign_fingerprint(
    fingerprint: &Fingerprint,
    private_key: &PrivateKey,
    algorithm: SignatureAlgorithm,
) -> Result<Vec<u8>> {
    let message = fingerprint.as_bytes();

    match (algorithm, private_key) {
        (SignatureAlgorithm::RsaPssSha256, PrivateKey::Rsa(key)) => {
            let signing_key = BlindedSigningKey::<Sha256>::new(key.clone());
            let signature: rsa::pss::Signature = signing_key
                .try_sign_with_rng(&mut OsRng, message)
                .map_err(|e| CryptoError::MalformedInput(format!("RSA-PSS signing failed: {}", e)))?;
            Ok(signature.to_vec())
        }
        (SignatureAlgorithm::EcdsaSha256, PrivateKey::Ecdsa(key)) => {
            let signing_key = p256::ecdsa::SigningKey::from(key);
            let signature: p256::ecdsa::Signature = signing_key
                .try_sign(message)
                .map_err(|e| CryptoError::MalformedInput(format!("ECDSA signing failed: {}", e)))?;
            Ok(signature.to_der().as_bytes().to_vec())
        }
        (algorithm, key) => Err(CryptoError::UnsupportedAlgorithm(format!(
            "{} cannot be used with a {} key",
            algorithm,
            key.algorithm()
        ))),
    }
}

/// Signs a fingerprint and returns the signature base64-encoded.
pub fn sign_fingerprint_base64(
    fingerprint: &Fingerprint,
    private_key: &PrivateKey,
    algorithm: SignatureAlgorithm,
) -> Result<String> {
    sign_fingerprint(fingerprint, private_key, algorithm).map(|sig| BASE64_STANDARD.encode(sig))
}

/// Parses an algorithm name and signs. Unknown names fail with
/// [`CryptoError::UnsupportedAlgorithm`].
pub fn sign_fingerprint_named(
    fingerprint: &Fingerprint,
    private_key: &PrivateKey,
    algorithm: &str,
) -> Result<Vec<u8>> {
    sign_fingerprint(fingerprint, private_key, algorithm.parse()?)
}
