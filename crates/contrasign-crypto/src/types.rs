//! Type definitions shared by the signing core.
//!
//! A [`Fingerprint`] is the content identity of an artifact. Signatures are
//! always produced over the 32 raw fingerprint bytes, never over a
//! serialized document, so any party holding the artifact can recompute
//! the signed message.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CryptoError;

/// Length in bytes of a SHA-256 fingerprint.
pub const FINGERPRINT_LEN: usize = 32;

/// Current version of the detached signature document.
pub const DETACHED_SIGNATURE_VERSION: &str = "1";

/// SHA-256 digest of an artifact's bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    pub fn from_bytes(bytes: [u8; FINGERPRINT_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }

    /// Lowercase, 64 character hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a fingerprint matching `^[A-Fa-f0-9]{64}$`.
    pub fn from_hex(value: &str) -> Result<Self, CryptoError> {
        if value.len() != FINGERPRINT_LEN * 2 || !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CryptoError::MalformedInput(format!(
                "fingerprint must be {} hex characters",
                FINGERPRINT_LEN * 2
            )));
        }

        let mut bytes = [0u8; FINGERPRINT_LEN];
        hex::decode_to_slice(value, &mut bytes)
            .map_err(|e| CryptoError::MalformedInput(format!("invalid fingerprint hex: {}", e)))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::from_hex(&value).map_err(serde::de::Error::custom)
    }
}

/// Signature schemes recognised by the signer and verifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    /// RSA-2048 with PSS padding over SHA-256. Output is randomized.
    #[default]
    #[serde(rename = "RSA-PSS-SHA256")]
    RsaPssSha256,
    /// ECDSA on P-256 over SHA-256 with RFC 6979 deterministic nonces.
    #[serde(rename = "ECDSA-SHA256")]
    EcdsaSha256,
}

impl SignatureAlgorithm {
    pub const ALL: [SignatureAlgorithm; 2] = [Self::RsaPssSha256, Self::EcdsaSha256];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RsaPssSha256 => "RSA-PSS-SHA256",
            Self::EcdsaSha256 => "ECDSA-SHA256",
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|algo| algo.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CryptoError::UnsupportedAlgorithm(s.to_string()))
    }
}

/// Reference to a hash of some content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HashRef {
    /// Hash algorithm used, always "sha-256"
    pub algo: String,
    /// Fingerprint of the content
    pub value: Fingerprint,
}

impl HashRef {
    pub fn sha256(value: Fingerprint) -> Self {
        Self {
            algo: "sha-256".to_string(),
            value,
        }
    }
}

/// Information about the artifact being signed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactInfo {
    /// Name/filename of the artifact
    pub name: String,
    /// Size of the artifact in bytes
    pub size: u64,
}

/// A portable signature over one artifact, written next to the artifact as
/// `<file>.sig.json`.
///
/// Only `hash.value` is covered by the signature. The remaining fields are
/// descriptive and are re-checked against the artifact by the verifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DetachedSignature {
    /// Document version, always "1"
    pub version: String,

    /// Signature algorithm
    pub algorithm: SignatureAlgorithm,

    /// Fingerprint of the signed content
    pub hash: HashRef,

    /// Information about the artifact
    pub artifact: ArtifactInfo,

    /// SPKI PEM public key of the signer
    pub public_key_pem: String,

    /// RFC 3339 timestamp of when the signature was created
    pub signed_at: String,

    /// Base64-encoded signature bytes
    pub signature: String,
}

impl DetachedSignature {
    pub fn new(
        algorithm: SignatureAlgorithm,
        fingerprint: Fingerprint,
        artifact: ArtifactInfo,
        public_key_pem: String,
        signed_at: String,
        signature: String,
    ) -> Self {
        Self {
            version: DETACHED_SIGNATURE_VERSION.to_string(),
            algorithm,
            hash: HashRef::sha256(fingerprint),
            artifact,
            public_key_pem,
            signed_at,
            signature,
        }
    }
}
