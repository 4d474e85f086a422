//! Signing service: the entry points the surrounding application calls.
//!
//! Key generation, password hashing, decryption and signing are CPU-bound
//! and run on the blocking pool. Decrypted keys live only inside those
//! closures.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use contrasign_crypto::{
    decrypt_private_key_str, encrypt_private_key, generate_keypair, hash_credential,
    sign_fingerprint, verify_credential, verify_fingerprint, CryptoError, Fingerprint, KdfParams,
    SignatureAlgorithm,
};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use tokio::sync::OnceCell;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::config::LedgerConfig;
use crate::db;
use crate::error::{LedgerError, Result};
use crate::ingest::fingerprint_stream;
use crate::ledger::SignatureLedger;
use crate::models::audit_log::{
    ACTION_ARTIFACT_INGEST, ACTION_ARTIFACT_SIGN, ACTION_ARTIFACT_SIGN_REJECTED,
    ACTION_IDENTITY_REGISTER, ACTION_SIGNATURE_VERIFY,
};
use crate::models::{
    Artifact, AuditLogEntry, Claims, Identity, NewArtifact, NewAuditLogEntry, NewIdentity, Role,
    SignatureRecord,
};
use crate::policy::{ContractStatus, SigningPolicy, SigningProgress};
use crate::store::{LedgerStore, MemoryStore, PgStore};

/// Key material produced at registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedKeys {
    pub algorithm: SignatureAlgorithm,
    pub public_key_pem: String,
    /// Vault blob text; opaque to callers.
    pub encrypted_private_key: String,
}

/// Output of signing a fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedFingerprint {
    pub algorithm: SignatureAlgorithm,
    pub signature_base64: String,
}

/// Generates a keypair and encrypts the private half under `password`.
pub fn issue_keys(
    password: &str,
    algorithm: SignatureAlgorithm,
    kdf: KdfParams,
) -> std::result::Result<IssuedKeys, CryptoError> {
    let pair = generate_keypair(algorithm)?;
    let blob = encrypt_private_key(&pair.private_key, password, kdf)?;
    Ok(IssuedKeys {
        algorithm,
        public_key_pem: pair.public_key_pem,
        encrypted_private_key: blob.to_string(),
    })
}

fn sign_with_blob(
    fingerprint: &Fingerprint,
    encrypted_private_key: &str,
    password: &str,
    algorithm: SignatureAlgorithm,
) -> std::result::Result<Vec<u8>, CryptoError> {
    let private_key = decrypt_private_key_str(encrypted_private_key, password)?;
    sign_fingerprint(fingerprint, &private_key, algorithm)
}

/// Password checked against the stand-in credential for unknown emails.
const UNKNOWN_IDENTITY_SECRET: &str = "contrasign-unknown-identity";

/// The signing core behind a storage handle.
pub struct SigningService<S> {
    store: Arc<S>,
    ledger: SignatureLedger<S>,
    config: LedgerConfig,
    /// Credential hash with the configured KDF cost, verified when a login
    /// names no identity.
    stand_in_credential: OnceCell<String>,
}

impl SigningService<MemoryStore> {
    /// A service over a fresh in-memory store.
    pub fn in_memory(config: LedgerConfig) -> Self {
        Self::new(Arc::new(MemoryStore::new()), config)
    }
}

impl SigningService<PgStore> {
    /// Connects to `config.database_url` and applies migrations.
    pub async fn connect(config: LedgerConfig) -> Result<Self> {
        let pool = db::connect(&config).await?;
        db::run_migrations(&pool)
            .await
            .map_err(|e| LedgerError::Internal(format!("migration failed: {}", e)))?;
        Ok(Self::new(Arc::new(PgStore::new(pool)), config))
    }
}

impl<S: LedgerStore> SigningService<S> {
    pub fn new(store: Arc<S>, config: LedgerConfig) -> Self {
        Self {
            ledger: SignatureLedger::new(Arc::clone(&store)),
            store,
            config,
            stand_in_credential: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn ledger(&self) -> &SignatureLedger<S> {
        &self.ledger
    }

    /// Hex SHA-256 fingerprint of `bytes` (64 lowercase hex characters).
    pub fn fingerprint(bytes: &[u8]) -> String {
        contrasign_crypto::fingerprint(bytes).to_hex()
    }

    /// Checks a signature offline. Needs no stored state.
    pub fn verify_artifact(
        fingerprint: &Fingerprint,
        signature: &[u8],
        public_key_pem: &str,
        algorithm: SignatureAlgorithm,
    ) -> Result<bool> {
        Ok(verify_fingerprint(fingerprint, signature, public_key_pem, algorithm)?)
    }

    async fn audit(&self, user_id: Option<Uuid>, action: &'static str, details: String) {
        if let Err(e) = self
            .store
            .append_audit(NewAuditLogEntry::new(user_id, action, details))
            .await
        {
            tracing::error!(action, "Failed to write audit log entry: {}", e);
        }
    }

    /// Issues a keypair for a new identity. Defaults to the configured
    /// algorithm.
    pub async fn issue_identity_keys(
        &self,
        password: &str,
        algorithm: Option<SignatureAlgorithm>,
    ) -> Result<IssuedKeys> {
        let algorithm = algorithm.unwrap_or(self.config.default_algorithm);
        let kdf = self.config.kdf;
        let password = Zeroizing::new(password.to_string());
        let keys =
            tokio::task::spawn_blocking(move || issue_keys(&password, algorithm, kdf)).await??;
        tracing::info!(%algorithm, "Issued identity keypair");
        Ok(keys)
    }

    /// Creates an identity with fresh keys and a login credential.
    pub async fn register_identity(
        &self,
        email: &str,
        password: &str,
        algorithm: Option<SignatureAlgorithm>,
    ) -> Result<Identity> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(LedgerError::BadRequest("a valid email is required".to_string()));
        }
        if password.is_empty() {
            return Err(LedgerError::BadRequest("password must not be empty".to_string()));
        }
        if self.store.find_identity_by_email(email).await?.is_some() {
            return Err(LedgerError::BadRequest(format!(
                "email '{}' is already registered",
                email
            )));
        }

        let keys = self.issue_identity_keys(password, algorithm).await?;
        let kdf = self.config.kdf;
        let secret = Zeroizing::new(password.to_string());
        let credential_hash =
            tokio::task::spawn_blocking(move || hash_credential(&secret, kdf)).await??;

        let identity = self
            .store
            .insert_identity(NewIdentity {
                email: email.to_string(),
                role: Role::Signer,
                algorithm: keys.algorithm,
                public_key_pem: keys.public_key_pem,
                encrypted_private_key: keys.encrypted_private_key,
                credential_hash,
            })
            .await?;

        tracing::info!(identity_id = %identity.id, algorithm = %identity.algorithm, "Registered identity");
        self.audit(
            Some(identity.id),
            ACTION_IDENTITY_REGISTER,
            format!("algorithm={}", identity.algorithm),
        )
        .await;
        Ok(identity)
    }

    async fn stand_in_credential(&self) -> Result<String> {
        let kdf = self.config.kdf;
        let hash = self
            .stand_in_credential
            .get_or_try_init(|| async move {
                let hash = tokio::task::spawn_blocking(move || {
                    hash_credential(UNKNOWN_IDENTITY_SECRET, kdf)
                })
                .await??;
                Ok::<_, LedgerError>(hash)
            })
            .await?;
        Ok(hash.clone())
    }

    /// Checks a login and returns the caller's claims.
    ///
    /// An unknown email still costs one credential verification, so both
    /// failures take the same path.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Claims> {
        let identity = self.store.find_identity_by_email(email.trim()).await?;
        let hash = match &identity {
            Some(identity) => identity.credential_hash.clone(),
            None => self.stand_in_credential().await?,
        };

        let secret = Zeroizing::new(password.to_string());
        let ok = tokio::task::spawn_blocking(move || verify_credential(&secret, &hash)).await?;
        match identity {
            Some(identity) if ok => Ok(Claims::for_identity(&identity)),
            Some(identity) => {
                tracing::warn!(identity_id = %identity.id, "Failed login");
                Err(LedgerError::Unauthorized)
            }
            None => {
                tracing::warn!("Failed login for unknown email");
                Err(LedgerError::Unauthorized)
            }
        }
    }

    /// Streams an uploaded artifact through the hasher and stores it.
    ///
    /// Nothing is stored when the stream fails or times out.
    pub async fn ingest_artifact<R>(
        &self,
        claims: &Claims,
        reader: R,
        media_type: &str,
        storage_ref: &str,
    ) -> Result<Artifact>
    where
        R: AsyncRead + Unpin + Send,
    {
        if claims.role == Role::Viewer {
            return Err(LedgerError::Forbidden("viewers may not upload documents".to_string()));
        }

        let (fingerprint, size_bytes) =
            fingerprint_stream(reader, self.config.hash_timeout()).await?;
        let artifact = self
            .store
            .insert_artifact(NewArtifact {
                fingerprint,
                size_bytes,
                media_type: media_type.to_string(),
                storage_ref: storage_ref.to_string(),
                created_by: Some(claims.sub),
            })
            .await?;

        tracing::info!(artifact_id = %artifact.id, %fingerprint, size_bytes, "Ingested artifact");
        self.audit(
            Some(claims.sub),
            ACTION_ARTIFACT_INGEST,
            format!("artifact={} fingerprint={} size={}", artifact.id, fingerprint, size_bytes),
        )
        .await;
        Ok(artifact)
    }

    async fn sign_raw(
        &self,
        fingerprint: &Fingerprint,
        password: &str,
        identity: &Identity,
        algorithm: Option<SignatureAlgorithm>,
    ) -> Result<(SignatureAlgorithm, Vec<u8>)> {
        let algorithm = algorithm.unwrap_or(identity.algorithm);
        let fingerprint = *fingerprint;
        let blob = identity.encrypted_private_key.clone();
        let secret = Zeroizing::new(password.to_string());
        let signature = tokio::task::spawn_blocking(move || {
            sign_with_blob(&fingerprint, &blob, &secret, algorithm)
        })
        .await??;
        Ok((algorithm, signature))
    }

    /// Decrypts the identity's key with `password`, signs, and drops the key.
    pub async fn sign_artifact(
        &self,
        fingerprint: &Fingerprint,
        password: &str,
        identity: &Identity,
        algorithm: Option<SignatureAlgorithm>,
    ) -> Result<SignedFingerprint> {
        let (algorithm, signature) = self.sign_raw(fingerprint, password, identity, algorithm).await?;
        Ok(SignedFingerprint {
            algorithm,
            signature_base64: BASE64_STANDARD.encode(signature),
        })
    }

    /// Signs an artifact as the caller and records the signature.
    ///
    /// No record is written when any step before the append fails.
    pub async fn sign_and_record(
        &self,
        claims: &Claims,
        artifact_id: Uuid,
        status: ContractStatus,
        password: &str,
        algorithm: Option<SignatureAlgorithm>,
    ) -> Result<SignatureRecord> {
        claims.ensure_can_sign_as(claims.sub)?;
        if !status.accepts_signatures() {
            return Err(LedgerError::InvalidState(format!(
                "contract is {}; only pending contracts can be signed",
                status
            )));
        }

        let identity = self
            .store
            .get_identity(claims.sub)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("identity {}", claims.sub)))?;
        let artifact = self
            .store
            .get_artifact(artifact_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("artifact {}", artifact_id)))?;

        let result = match self.ledger.has_signed(artifact_id, identity.id).await {
            Ok(true) => Err(LedgerError::DuplicateSignature {
                artifact_id,
                signer_id: identity.id,
            }),
            Ok(false) => match self
                .sign_raw(&artifact.fingerprint, password, &identity, algorithm)
                .await
            {
                Ok((algorithm, signature)) => {
                    self.ledger
                        .record_signature(artifact_id, identity.id, algorithm, signature)
                        .await
                }
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        match &result {
            Ok(record) => {
                self.audit(
                    Some(claims.sub),
                    ACTION_ARTIFACT_SIGN,
                    format!(
                        "artifact={} record={} algorithm={} valid={}",
                        artifact_id, record.id, record.algorithm, record.is_valid
                    ),
                )
                .await
            }
            Err(e) => {
                self.audit(
                    Some(claims.sub),
                    ACTION_ARTIFACT_SIGN_REJECTED,
                    format!("artifact={} reason={}", artifact_id, e.user_message()),
                )
                .await
            }
        }
        result
    }

    /// Re-verifies a stored record against the signer's stored key and the
    /// artifact's stored fingerprint.
    pub async fn audit_signature(&self, claims: &Claims, record_id: Uuid) -> Result<bool> {
        let record = self
            .store
            .get_signature(record_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("signature record {}", record_id)))?;
        let artifact = self
            .store
            .get_artifact(record.artifact_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("artifact {}", record.artifact_id)))?;
        let signer = self
            .store
            .get_identity(record.signer_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("identity {}", record.signer_id)))?;

        let valid = Self::verify_artifact(
            &artifact.fingerprint,
            &record.signature,
            &signer.public_key_pem,
            record.algorithm,
        )?;
        if valid != record.is_valid {
            tracing::warn!(%record_id, stored = record.is_valid, valid, "Stored validity disagrees with re-verification");
        }

        self.audit(
            Some(claims.sub),
            ACTION_SIGNATURE_VERIFY,
            format!("record={} valid={}", record_id, valid),
        )
        .await;
        Ok(valid)
    }

    pub async fn list_signatures(&self, artifact_id: Uuid) -> Result<Vec<SignatureRecord>> {
        self.ledger.list_signatures(artifact_id).await
    }

    pub async fn verify_chain(&self, artifact_id: Uuid) -> Result<bool> {
        self.ledger.verify_chain(artifact_id).await
    }

    /// Evaluates an artifact's records against a signing policy.
    pub async fn signing_progress(
        &self,
        artifact_id: Uuid,
        policy: &SigningPolicy,
    ) -> Result<SigningProgress> {
        policy.validate()?;
        let records = self.ledger.list_signatures(artifact_id).await?;
        Ok(policy.evaluate(&records))
    }

    /// Most recent audit entries first.
    pub async fn list_audit_log(&self, limit: usize) -> Result<Vec<AuditLogEntry>> {
        self.store.list_audit(limit).await
    }
}
