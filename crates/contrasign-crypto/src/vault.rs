//! Password protection for private keys at rest.
//!
//! A private key is serialized to PKCS#8 DER and sealed with AES-256-GCM
//! under a key derived from the user's password with Argon2id. Every
//! encryption draws a fresh salt and nonce. The resulting blob is a single
//! printable string:
//!
//! ```text
//! cs1$argon2id$m=19456,t=2,p=1$<salt_b64>$<nonce_b64>:<ciphertext_b64>
//! ```
//!
//! Everything before the final `$` is bound to the ciphertext as associated
//! data, so the KDF parameters cannot be swapped without failing decryption.
//! All failures while opening a blob collapse into
//! [`CryptoError::Decryption`].

use std::fmt;
use std::str::FromStr;

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{CryptoError, Result};
use crate::keys::PrivateKey;

const BLOB_VERSION: &str = "cs1";
const KDF_NAME: &str = "argon2id";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Upper bound on memory cost accepted when opening a blob (256 MiB).
pub const MAX_MEMORY_KIB: u32 = 256 * 1024;
/// Upper bound on iterations accepted when opening a blob.
pub const MAX_ITERATIONS: u32 = 16;
/// Upper bound on lanes accepted when opening a blob.
pub const MAX_PARALLELISM: u32 = 8;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    /// OWASP baseline for Argon2id: 19 MiB, 2 passes, 1 lane.
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    /// Checks the parameters against both the Argon2 minimums and the
    /// ceilings above.
    pub fn validate(&self) -> Result<()> {
        if self.memory_kib > MAX_MEMORY_KIB
            || self.iterations > MAX_ITERATIONS
            || self.parallelism > MAX_PARALLELISM
        {
            return Err(CryptoError::MalformedInput(
                "KDF parameters exceed the allowed maximum".to_string(),
            ));
        }
        self.argon2().map(|_| ())
    }

    fn argon2(&self) -> Result<Argon2<'static>> {
        let params = Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(KEY_LEN),
        )
        .map_err(|e| CryptoError::MalformedInput(format!("invalid KDF parameters: {}", e)))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    fn derive_key(&self, password: &str, salt: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        self.argon2()?
            .hash_password_into(password.as_bytes(), salt, &mut key[..])
            .map_err(|e| CryptoError::MalformedInput(format!("key derivation failed: {}", e)))?;
        Ok(key)
    }
}

impl fmt::Display for KdfParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "m={},t={},p={}",
            self.memory_kib, self.iterations, self.parallelism
        )
    }
}

impl FromStr for KdfParams {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self> {
        let mut memory_kib = None;
        let mut iterations = None;
        let mut parallelism = None;

        for part in s.split(',') {
            let (name, value) = part
                .split_once('=')
                .ok_or_else(|| CryptoError::MalformedInput(format!("invalid KDF field '{}'", part)))?;
            let value: u32 = value
                .parse()
                .map_err(|_| CryptoError::MalformedInput(format!("invalid KDF value '{}'", part)))?;
            let slot = match name {
                "m" => &mut memory_kib,
                "t" => &mut iterations,
                "p" => &mut parallelism,
                _ => {
                    return Err(CryptoError::MalformedInput(format!(
                        "unknown KDF field '{}'",
                        name
                    )))
                }
            };
            if slot.replace(value).is_some() {
                return Err(CryptoError::MalformedInput(format!(
                    "duplicate KDF field '{}'",
                    name
                )));
            }
        }

        match (memory_kib, iterations, parallelism) {
            (Some(memory_kib), Some(iterations), Some(parallelism)) => Ok(Self {
                memory_kib,
                iterations,
                parallelism,
            }),
            _ => Err(CryptoError::MalformedInput(
                "missing KDF parameter".to_string(),
            )),
        }
    }
}

/// A password-encrypted private key.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedKeyBlob {
    params: KdfParams,
    salt: [u8; SALT_LEN],
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
}

impl EncryptedKeyBlob {
    pub fn params(&self) -> KdfParams {
        self.params
    }

    pub fn nonce(&self) -> &[u8] {
        &self.nonce
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    fn header(&self) -> String {
        format!(
            "{}${}${}${}",
            BLOB_VERSION,
            KDF_NAME,
            self.params,
            BASE64_STANDARD.encode(self.salt)
        )
    }
}

impl fmt::Display for EncryptedKeyBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}${}:{}",
            self.header(),
            BASE64_STANDARD.encode(self.nonce),
            BASE64_STANDARD.encode(&self.ciphertext)
        )
    }
}

impl fmt::Debug for EncryptedKeyBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedKeyBlob")
            .field("params", &self.params)
            .field("ciphertext_len", &self.ciphertext.len())
            .finish_non_exhaustive()
    }
}

impl FromStr for EncryptedKeyBlob {
    type Err = CryptoError;

    /// Parses a blob. Any format problem is reported as
    /// [`CryptoError::Decryption`].
    fn from_str(s: &str) -> Result<Self> {
        parse_blob(s.trim()).ok_or(CryptoError::Decryption)
    }
}

fn parse_blob(s: &str) -> Option<EncryptedKeyBlob> {
    let mut parts = s.split('$');
    let version = parts.next()?;
    let kdf = parts.next()?;
    let params = parts.next()?;
    let salt = parts.next()?;
    let sealed = parts.next()?;
    if parts.next().is_some() || version != BLOB_VERSION || kdf != KDF_NAME {
        return None;
    }

    let params: KdfParams = params.parse().ok()?;
    params.validate().ok()?;

    let (nonce, ciphertext) = sealed.split_once(':')?;
    let salt: [u8; SALT_LEN] = BASE64_STANDARD.decode(salt).ok()?.try_into().ok()?;
    let nonce: [u8; NONCE_LEN] = BASE64_STANDARD.decode(nonce).ok()?.try_into().ok()?;
    let ciphertext = BASE64_STANDARD.decode(ciphertext).ok()?;

    Some(EncryptedKeyBlob {
        params,
        salt,
        nonce,
        ciphertext,
    })
}

/// Encrypts a private key under `password`.
///
/// A new random salt and nonce are generated on every call, so encrypting
/// the same key twice yields unrelated blobs.
pub fn encrypt_private_key(
    private_key: &PrivateKey,
    password: &str,
    params: KdfParams,
) -> Result<EncryptedKeyBlob> {
    params.validate()?;

    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut nonce);

    let plaintext = private_key.to_pkcs8_der()?;
    let key = params.derive_key(password, &salt)?;

    let mut blob = EncryptedKeyBlob {
        params,
        salt,
        nonce,
        ciphertext: Vec::new(),
    };
    let aad = blob.header();

    let cipher = Aes256Gcm::new_from_slice(&key[..])
        .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
    blob.ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext.as_slice(),
                aad: aad.as_bytes(),
            },
        )
        .map_err(|_| CryptoError::KeyGeneration("private key encryption failed".to_string()))?;

    Ok(blob)
}

/// Decrypts a private key. A wrong password and a damaged blob both yield
/// [`CryptoError::Decryption`].
pub fn decrypt_private_key(blob: &EncryptedKeyBlob, password: &str) -> Result<PrivateKey> {
    let key = blob
        .params
        .derive_key(password, &blob.salt)
        .map_err(|_| CryptoError::Decryption)?;
    let aad = blob.header();

    let cipher = Aes256Gcm::new_from_slice(&key[..]).map_err(|_| CryptoError::Decryption)?;
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&blob.nonce),
            Payload {
                msg: &blob.ciphertext,
                aad: aad.as_bytes(),
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::Decryption)?;

    PrivateKey::from_pkcs8_der(&plaintext).map_err(|_| CryptoError::Decryption)
}

/// Parses and decrypts a blob in its stored string form.
pub fn decrypt_private_key_str(blob: &str, password: &str) -> Result<PrivateKey> {
    let blob: EncryptedKeyBlob = blob.parse()?;
    decrypt_private_key(&blob, password)
}

/// Hashes a login credential into a PHC string (Argon2id, random salt).
///
/// This hash is only ever used to authenticate the user; it is never used
/// as key material.
pub fn hash_credential(password: &str, params: KdfParams) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    params
        .argon2()?
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CryptoError::KeyGeneration(format!("credential hashing failed: {}", e)))
}

/// Checks a password against a stored PHC credential hash.
pub fn verify_credential(password: &str, credential_hash: &str) -> bool {
    match PasswordHash::new(credential_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}
