// Contrasign Crypto - document signing and verification core

pub mod error;
pub mod hash;
pub mod keys;
pub mod sign;
pub mod types;
pub mod vault;
pub mod verify;

pub use error::CryptoError;
pub use hash::{fingerprint, fingerprint_reader, sha256_hex, FingerprintHasher};
pub use keys::{generate_keypair, KeyPair, PrivateKey, PublicKey};
pub use sign::{sign_fingerprint, sign_fingerprint_base64, sign_fingerprint_named};
pub use types::{
    ArtifactInfo, DetachedSignature, Fingerprint, HashRef, SignatureAlgorithm, FINGERPRINT_LEN,
};
pub use vault::{
    decrypt_private_key, decrypt_private_key_str, encrypt_private_key, hash_credential,
    verify_credential, EncryptedKeyBlob, KdfParams,
};
pub use verify::{
    verify_detached, verify_fingerprint, verify_fingerprint_base64, verify_with_key,
    DetachedVerification,
};
