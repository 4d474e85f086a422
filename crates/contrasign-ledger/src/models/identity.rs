//! Identity model: a user's issued keypair and login credential.

use chrono::{DateTime, Utc};
use contrasign_crypto::SignatureAlgorithm;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::claims::Role;

/// A registered signer.
///
/// `public_key_pem` and `encrypted_private_key` are written once at
/// registration and never change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    /// Login email, unique across identities.
    pub email: String,
    pub role: Role,
    /// Algorithm the issued key is used with.
    pub algorithm: SignatureAlgorithm,
    /// SPKI PEM public key.
    pub public_key_pem: String,
    /// Password-encrypted PKCS#8 private key (vault blob text).
    #[serde(skip_serializing)]
    pub encrypted_private_key: String,
    /// Argon2id PHC string, used only for login.
    #[serde(skip_serializing)]
    pub credential_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Data required to create a new identity.
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub email: String,
    pub role: Role,
    pub algorithm: SignatureAlgorithm,
    pub public_key_pem: String,
    pub encrypted_private_key: String,
    pub credential_hash: String,
}

impl NewIdentity {
    /// Assigns an id and creation time.
    pub fn into_identity(self) -> Identity {
        Identity {
            id: Uuid::new_v4(),
            email: self.email,
            role: self.role,
            algorithm: self.algorithm,
            public_key_pem: self.public_key_pem,
            encrypted_private_key: self.encrypted_private_key,
            credential_hash: self.credential_hash,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_identity_omits_secrets() {
        let identity = NewIdentity {
            email: "alice@example.com".to_string(),
            role: Role::Signer,
            algorithm: SignatureAlgorithm::EcdsaSha256,
            public_key_pem: "-----BEGIN PUBLIC KEY-----".to_string(),
            encrypted_private_key: "cs1$argon2id$secret".to_string(),
            credential_hash: "$argon2id$v=19$secret".to_string(),
        }
        .into_identity();

        let json = serde_json::to_string(&identity).unwrap();
        assert!(json.contains("alice@example.com"));
        assert!(json.contains("ECDSA-SHA256"));
        assert!(!json.contains("secret"));
    }
}
