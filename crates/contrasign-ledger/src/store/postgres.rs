//! PostgreSQL store.
//!
//! Appends to `signature_records` take a transaction-scoped advisory lock
//! keyed on the artifact, so chain linking is serialized per artifact. The
//! `(artifact_id, signer_id)` unique constraint backs up the duplicate check
//! across processes.

use chrono::{DateTime, Utc};
use contrasign_crypto::{Fingerprint, SignatureAlgorithm};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::LedgerStore;
use crate::error::{LedgerError, Result};
use crate::models::{
    Artifact, AuditLogEntry, Identity, NewArtifact, NewAuditLogEntry, NewIdentity,
    NewSignatureRecord, RecordDigest, Role, SignatureRecord, GENESIS_DIGEST,
};

const SIGNER_UNIQUE_CONSTRAINT: &str = "signature_records_artifact_signer_key";
const EMAIL_UNIQUE_INDEX: &str = "identities_email_key";

const IDENTITY_COLUMNS: &str = "id, email, role, algorithm, public_key_pem, \
     encrypted_private_key, credential_hash, created_at";
const ARTIFACT_COLUMNS: &str =
    "id, fingerprint, size_bytes, media_type, storage_ref, created_by, created_at";
const SIGNATURE_COLUMNS: &str = "id, artifact_id, signer_id, algorithm, signature, is_valid, \
     signed_at, prev_digest, record_digest";

/// A [`LedgerStore`] backed by a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(FromRow)]
struct IdentityRow {
    id: Uuid,
    email: String,
    role: Role,
    algorithm: String,
    public_key_pem: String,
    encrypted_private_key: String,
    credential_hash: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<IdentityRow> for Identity {
    type Error = LedgerError;

    fn try_from(row: IdentityRow) -> Result<Self> {
        Ok(Identity {
            id: row.id,
            email: row.email,
            role: row.role,
            algorithm: parse_algorithm(&row.algorithm, row.id)?,
            public_key_pem: row.public_key_pem,
            encrypted_private_key: row.encrypted_private_key,
            credential_hash: row.credential_hash,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct ArtifactRow {
    id: Uuid,
    fingerprint: String,
    size_bytes: i64,
    media_type: String,
    storage_ref: String,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ArtifactRow> for Artifact {
    type Error = LedgerError;

    fn try_from(row: ArtifactRow) -> Result<Self> {
        let fingerprint = Fingerprint::from_hex(&row.fingerprint)
            .map_err(|e| corrupt_row("artifact", row.id, e))?;
        let size_bytes =
            u64::try_from(row.size_bytes).map_err(|e| corrupt_row("artifact", row.id, e))?;
        Ok(Artifact {
            id: row.id,
            fingerprint,
            size_bytes,
            media_type: row.media_type,
            storage_ref: row.storage_ref,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct SignatureRow {
    id: Uuid,
    artifact_id: Uuid,
    signer_id: Uuid,
    algorithm: String,
    signature: Vec<u8>,
    is_valid: bool,
    signed_at: DateTime<Utc>,
    prev_digest: Vec<u8>,
    record_digest: Vec<u8>,
}

impl TryFrom<SignatureRow> for SignatureRecord {
    type Error = LedgerError;

    fn try_from(row: SignatureRow) -> Result<Self> {
        Ok(SignatureRecord {
            id: row.id,
            artifact_id: row.artifact_id,
            signer_id: row.signer_id,
            algorithm: parse_algorithm(&row.algorithm, row.id)?,
            signature: row.signature,
            is_valid: row.is_valid,
            signed_at: row.signed_at,
            prev_digest: digest_from_column(&row.prev_digest, row.id)?,
            record_digest: digest_from_column(&row.record_digest, row.id)?,
        })
    }
}

fn corrupt_row(table: &str, id: Uuid, e: impl std::fmt::Display) -> LedgerError {
    LedgerError::Internal(format!("corrupt {} row {}: {}", table, id, e))
}

fn parse_algorithm(value: &str, id: Uuid) -> Result<SignatureAlgorithm> {
    value.parse().map_err(|e| corrupt_row("record", id, e))
}

fn digest_from_column(bytes: &[u8], id: Uuid) -> Result<RecordDigest> {
    RecordDigest::try_from(bytes).map_err(|e| corrupt_row("signature_records", id, e))
}

fn map_signature_insert_error(e: sqlx::Error, record: &SignatureRecord) -> LedgerError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.constraint() == Some(SIGNER_UNIQUE_CONSTRAINT) {
            return LedgerError::DuplicateSignature {
                artifact_id: record.artifact_id,
                signer_id: record.signer_id,
            };
        }
        if db_err.is_foreign_key_violation() {
            return LedgerError::NotFound(format!(
                "artifact {} or identity {}",
                record.artifact_id, record.signer_id
            ));
        }
    }
    tracing::error!("Failed to append signature record: {}", e);
    LedgerError::Database(e)
}

impl LedgerStore for PgStore {
    async fn insert_identity(&self, identity: NewIdentity) -> Result<Identity> {
        let identity = identity.into_identity();
        sqlx::query(
            r#"
            INSERT INTO identities (id, email, role, algorithm, public_key_pem,
                                    encrypted_private_key, credential_hash, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(identity.id)
        .bind(&identity.email)
        .bind(identity.role)
        .bind(identity.algorithm.as_str())
        .bind(&identity.public_key_pem)
        .bind(&identity.encrypted_private_key)
        .bind(&identity.credential_hash)
        .bind(identity.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.constraint() == Some(EMAIL_UNIQUE_INDEX) => {
                LedgerError::BadRequest(format!("email '{}' is already registered", identity.email))
            }
            _ => LedgerError::Database(e),
        })?;
        Ok(identity)
    }

    async fn get_identity(&self, id: Uuid) -> Result<Option<Identity>> {
        let row: Option<IdentityRow> =
            sqlx::query_as(&format!("SELECT {} FROM identities WHERE id = $1", IDENTITY_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Identity::try_from).transpose()
    }

    async fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>> {
        let row: Option<IdentityRow> = sqlx::query_as(&format!(
            "SELECT {} FROM identities WHERE lower(email) = lower($1)",
            IDENTITY_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Identity::try_from).transpose()
    }

    async fn insert_artifact(&self, artifact: NewArtifact) -> Result<Artifact> {
        let artifact = artifact.into_artifact();
        let size_bytes = i64::try_from(artifact.size_bytes)
            .map_err(|_| LedgerError::BadRequest("artifact is too large".to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO artifacts (id, fingerprint, size_bytes, media_type, storage_ref,
                                   created_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(artifact.id)
        .bind(artifact.fingerprint.to_hex())
        .bind(size_bytes)
        .bind(&artifact.media_type)
        .bind(&artifact.storage_ref)
        .bind(artifact.created_by)
        .bind(artifact.created_at)
        .execute(&self.pool)
        .await?;
        Ok(artifact)
    }

    async fn get_artifact(&self, id: Uuid) -> Result<Option<Artifact>> {
        let row: Option<ArtifactRow> =
            sqlx::query_as(&format!("SELECT {} FROM artifacts WHERE id = $1", ARTIFACT_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Artifact::try_from).transpose()
    }

    async fn append_signature(&self, record: NewSignatureRecord) -> Result<SignatureRecord> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(record.artifact_id.to_string())
            .execute(&mut *tx)
            .await?;

        let existing: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM signature_records WHERE artifact_id = $1 AND signer_id = $2",
        )
        .bind(record.artifact_id)
        .bind(record.signer_id)
        .fetch_optional(&mut *tx)
        .await?;
        if existing.is_some() {
            return Err(LedgerError::DuplicateSignature {
                artifact_id: record.artifact_id,
                signer_id: record.signer_id,
            });
        }

        let last: Option<(Uuid, Vec<u8>)> = sqlx::query_as(
            r#"
            SELECT id, record_digest FROM signature_records
            WHERE artifact_id = $1
            ORDER BY seq DESC
            LIMIT 1
            "#,
        )
        .bind(record.artifact_id)
        .fetch_optional(&mut *tx)
        .await?;
        let prev_digest = match last {
            Some((id, digest)) => digest_from_column(&digest, id)?,
            None => GENESIS_DIGEST,
        };

        let sealed = record.seal(prev_digest);
        sqlx::query(
            r#"
            INSERT INTO signature_records (id, artifact_id, signer_id, algorithm, signature,
                                           is_valid, signed_at, prev_digest, record_digest)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(sealed.id)
        .bind(sealed.artifact_id)
        .bind(sealed.signer_id)
        .bind(sealed.algorithm.as_str())
        .bind(&sealed.signature)
        .bind(sealed.is_valid)
        .bind(sealed.signed_at)
        .bind(&sealed.prev_digest[..])
        .bind(&sealed.record_digest[..])
        .execute(&mut *tx)
        .await
        .map_err(|e| map_signature_insert_error(e, &sealed))?;

        tx.commit().await?;
        Ok(sealed)
    }

    async fn get_signature(&self, id: Uuid) -> Result<Option<SignatureRecord>> {
        let row: Option<SignatureRow> = sqlx::query_as(&format!(
            "SELECT {} FROM signature_records WHERE id = $1",
            SIGNATURE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(SignatureRecord::try_from).transpose()
    }

    async fn find_signature(
        &self,
        artifact_id: Uuid,
        signer_id: Uuid,
    ) -> Result<Option<SignatureRecord>> {
        let row: Option<SignatureRow> = sqlx::query_as(&format!(
            "SELECT {} FROM signature_records WHERE artifact_id = $1 AND signer_id = $2",
            SIGNATURE_COLUMNS
        ))
        .bind(artifact_id)
        .bind(signer_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(SignatureRecord::try_from).transpose()
    }

    async fn list_signatures(&self, artifact_id: Uuid) -> Result<Vec<SignatureRecord>> {
        let rows: Vec<SignatureRow> = sqlx::query_as(&format!(
            "SELECT {} FROM signature_records WHERE artifact_id = $1 ORDER BY seq ASC",
            SIGNATURE_COLUMNS
        ))
        .bind(artifact_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(SignatureRecord::try_from).collect()
    }

    async fn append_audit(&self, entry: NewAuditLogEntry) -> Result<AuditLogEntry> {
        let entry = entry.into_entry();
        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, user_id, action, details, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(&entry.action)
        .bind(&entry.details)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(entry)
    }

    async fn list_audit(&self, limit: usize) -> Result<Vec<AuditLogEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let entries = sqlx::query_as::<_, AuditLogEntry>(
            r#"
            SELECT id, user_id, action, details, created_at
            FROM audit_logs
            ORDER BY seq DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }
}
