//! Signature record model: one immutable signing act.
//!
//! Records for the same artifact form a hash chain. Each record stores the
//! digest of its predecessor and a digest over its own fields, so editing or
//! removing a stored record is detectable by recomputing the chain.

use chrono::{DateTime, SubsecRound, Utc};
use contrasign_crypto::SignatureAlgorithm;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// SHA-256 digest linking records in a chain.
pub type RecordDigest = [u8; 32];

/// `prev_digest` of the first record of every artifact.
pub const GENESIS_DIGEST: RecordDigest = [0u8; 32];

/// A persisted signature over an artifact's fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub id: Uuid,
    pub artifact_id: Uuid,
    pub signer_id: Uuid,
    pub algorithm: SignatureAlgorithm,
    /// Raw signature bytes (base64 in JSON).
    #[serde(with = "base64_bytes")]
    pub signature: Vec<u8>,
    /// Result of verifying against the signer's key at append time.
    pub is_valid: bool,
    pub signed_at: DateTime<Utc>,
    #[serde(with = "hex")]
    pub prev_digest: RecordDigest,
    #[serde(with = "hex")]
    pub record_digest: RecordDigest,
}

/// Data required to append a signature record.
#[derive(Debug, Clone)]
pub struct NewSignatureRecord {
    pub artifact_id: Uuid,
    pub signer_id: Uuid,
    pub algorithm: SignatureAlgorithm,
    pub signature: Vec<u8>,
    pub is_valid: bool,
}

impl NewSignatureRecord {
    /// Fixes id, timestamp and chain position, producing the stored record.
    ///
    /// Timestamps are truncated to microseconds so the digest survives a
    /// round trip through PostgreSQL `TIMESTAMPTZ`.
    pub fn seal(self, prev_digest: RecordDigest) -> SignatureRecord {
        let mut record = SignatureRecord {
            id: Uuid::new_v4(),
            artifact_id: self.artifact_id,
            signer_id: self.signer_id,
            algorithm: self.algorithm,
            signature: self.signature,
            is_valid: self.is_valid,
            signed_at: Utc::now().trunc_subsecs(6),
            prev_digest,
            record_digest: GENESIS_DIGEST,
        };
        record.record_digest = record.compute_digest();
        record
    }
}

impl SignatureRecord {
    /// Recomputes this record's digest from its fields.
    pub fn compute_digest(&self) -> RecordDigest {
        fn field(hasher: &mut Sha256, bytes: &[u8]) {
            hasher.update((bytes.len() as u64).to_be_bytes());
            hasher.update(bytes);
        }

        let mut hasher = Sha256::new();
        field(&mut hasher, &self.prev_digest);
        field(&mut hasher, self.id.as_bytes());
        field(&mut hasher, self.artifact_id.as_bytes());
        field(&mut hasher, self.signer_id.as_bytes());
        field(&mut hasher, self.algorithm.as_str().as_bytes());
        field(&mut hasher, &self.signature);
        field(&mut hasher, &[u8::from(self.is_valid)]);
        field(&mut hasher, &self.signed_at.timestamp_micros().to_be_bytes());
        hasher.finalize().into()
    }

    /// True when the stored digest matches the fields.
    pub fn is_sealed(&self) -> bool {
        self.compute_digest() == self.record_digest
    }
}

/// Checks that `records` (in append order) form an unbroken chain.
pub fn chain_is_intact(records: &[SignatureRecord]) -> bool {
    let mut expected_prev = GENESIS_DIGEST;
    for record in records {
        if record.prev_digest != expected_prev || !record.is_sealed() {
            return false;
        }
        expected_prev = record.record_digest;
    }
    true
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64_STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        BASE64_STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
