// Key generation and encoding for Contrasign identities

use std::fmt;

use p256::pkcs8::{DecodePrivateKey as _, DecodePublicKey as _, EncodePrivateKey as _};
use rand_core::OsRng;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use zeroize::Zeroizing;

use crate::error::{CryptoError, Result};
use crate::types::SignatureAlgorithm;

/// RSA modulus size for newly issued identities.
pub const RSA_KEY_BITS: usize = 2048;

/// A decrypted private key.
///
/// Both variants wipe their secret material on drop. The `Debug`
/// implementation never prints key material.
pub enum PrivateKey {
    Rsa(RsaPrivateKey),
    Ecdsa(p256::SecretKey),
}

impl PrivateKey {
    /// The signature algorithm this key is used with.
    pub fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            PrivateKey::Rsa(_) => SignatureAlgorithm::RsaPssSha256,
            PrivateKey::Ecdsa(_) => SignatureAlgorithm::EcdsaSha256,
        }
    }

    /// Encodes the key as PKCS#8 DER into a buffer that is zeroed on drop.
    pub fn to_pkcs8_der(&self) -> Result<Zeroizing<Vec<u8>>> {
        let document = match self {
            PrivateKey::Rsa(key) => rsa::pkcs8::EncodePrivateKey::to_pkcs8_der(key),
            PrivateKey::Ecdsa(key) => key.to_pkcs8_der(),
        }
        .map_err(|e| CryptoError::KeyGeneration(format!("failed to encode private key: {}", e)))?;

        Ok(Zeroizing::new(document.as_bytes().to_vec()))
    }

    /// Decodes a PKCS#8 DER private key, detecting RSA vs P-256 from the
    /// algorithm identifier.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        if let Ok(key) = rsa::pkcs8::DecodePrivateKey::from_pkcs8_der(der) {
            return Ok(PrivateKey::Rsa(key));
        }
        p256::SecretKey::from_pkcs8_der(der)
            .map(PrivateKey::Ecdsa)
            .map_err(|_| CryptoError::MalformedInput("unrecognised PKCS#8 private key".to_string()))
    }

    /// Derives the SPKI PEM public key for this private key.
    pub fn public_key_pem(&self) -> Result<String> {
        match self {
            PrivateKey::Rsa(key) => RsaPublicKey::from(key)
                .to_public_key_pem(LineEnding::LF)
                .map_err(|e| CryptoError::KeyGeneration(format!("failed to encode public key: {}", e))),
            PrivateKey::Ecdsa(key) => {
                p256::pkcs8::EncodePublicKey::to_public_key_pem(&key.public_key(), LineEnding::LF)
                    .map_err(|e| CryptoError::KeyGeneration(format!("failed to encode public key: {}", e)))
            }
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey({}, <redacted>)", self.algorithm())
    }
}

/// A parsed public key, as read back from an Identity record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    Ecdsa(p256::PublicKey),
}

impl PublicKey {
    /// Parses an SPKI PEM public key of either supported type.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let pem = pem.trim();
        if let Ok(key) = rsa::pkcs8::DecodePublicKey::from_public_key_pem(pem) {
            return Ok(PublicKey::Rsa(key));
        }
        p256::PublicKey::from_public_key_pem(pem)
            .map(PublicKey::Ecdsa)
            .map_err(|_| CryptoError::MalformedInput("unrecognised public key PEM".to_string()))
    }

    pub fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            PublicKey::Rsa(_) => SignatureAlgorithm::RsaPssSha256,
            PublicKey::Ecdsa(_) => SignatureAlgorithm::EcdsaSha256,
        }
    }
}

/// A freshly generated identity keypair.
#[derive(Debug)]
pub struct KeyPair {
    /// SPKI PEM encoded public key, immutable once issued.
    pub public_key_pem: String,
    pub private_key: PrivateKey,
}

/// Generates a new keypair for the given algorithm using the OS CSPRNG.
///
/// RSA-PSS-SHA256 yields an RSA-2048 key, ECDSA-SHA256 a P-256 key.
pub fn generate_keypair(algorithm: SignatureAlgorithm) -> Result<KeyPair> {
    let private_key = match algorithm {
        SignatureAlgorithm::RsaPssSha256 => {
            let key = RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS)
                .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
            PrivateKey::Rsa(key)
        }
        SignatureAlgorithm::EcdsaSha256 => PrivateKey::Ecdsa(p256::SecretKey::random(&mut OsRng)),
    };
    let public_key_pem = private_key.public_key_pem()?;

    Ok(KeyPair {
        public_key_pem,
        private_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_rsa_keypair() {
        let pair = generate_keypair(SignatureAlgorithm::RsaPssSha256).unwrap();
        assert!(pair.public_key_pem.starts_with("-----BEGIN PUBLIC KEY-----"));
        assert_eq!(pair.private_key.algorithm(), SignatureAlgorithm::RsaPssSha256);

        let public = PublicKey::from_pem(&pair.public_key_pem).unwrap();
        match public {
            PublicKey::Rsa(key) => assert_eq!(rsa::traits::PublicKeyParts::size(&key), RSA_KEY_BITS / 8),
            other => panic!("expected RSA key, got {:?}", other.algorithm()),
        }
    }

    #[test]
    fn test_generate_ecdsa_keypair() {
        let pair = generate_keypair(SignatureAlgorithm::EcdsaSha256).unwrap();
        let public = PublicKey::from_pem(&pair.public_key_pem).unwrap();
        assert_eq!(public.algorithm(), SignatureAlgorithm::EcdsaSha256);
    }

    #[test]
    fn test_generate_keypair_produces_different_keys() {
        let a = generate_keypair(SignatureAlgorithm::EcdsaSha256).unwrap();
        let b = generate_keypair(SignatureAlgorithm::EcdsaSha256).unwrap();
        assert_ne!(a.public_key_pem, b.public_key_pem);
    }

    #[test]
    fn test_pkcs8_roundtrip_preserves_key() {
        for algorithm in SignatureAlgorithm::ALL {
            let pair = generate_keypair(algorithm).unwrap();
            let der = pair.private_key.to_pkcs8_der().unwrap();
            let restored = PrivateKey::from_pkcs8_der(&der).unwrap();

            assert_eq!(restored.algorithm(), algorithm);
            assert_eq!(restored.public_key_pem().unwrap(), pair.public_key_pem);
        }
    }

    #[test]
    fn test_debug_output_is_redacted() {
        let pair = generate_keypair(SignatureAlgorithm::EcdsaSha256).unwrap();
        let debug = format!("{:?}", pair.private_key);
        assert_eq!(debug, "PrivateKey(ECDSA-SHA256, <redacted>)");
    }

    #[test]
    fn test_garbage_inputs_are_malformed() {
        assert!(matches!(
            PrivateKey::from_pkcs8_der(b"not a key"),
            Err(CryptoError::MalformedInput(_))
        ));
        assert!(matches!(
            PublicKey::from_pem("-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----"),
            Err(CryptoError::MalformedInput(_))
        ));
    }
}
