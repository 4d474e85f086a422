//! In-process store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use uuid::Uuid;

use super::LedgerStore;
use crate::error::{LedgerError, Result};
use crate::models::{
    Artifact, AuditLogEntry, Identity, NewArtifact, NewAuditLogEntry, NewIdentity,
    NewSignatureRecord, SignatureRecord, GENESIS_DIGEST,
};

#[derive(Debug, Default)]
struct Tables {
    identities: HashMap<Uuid, Identity>,
    artifacts: HashMap<Uuid, Artifact>,
    /// Append order across all artifacts.
    signatures: Vec<SignatureRecord>,
    audit: Vec<AuditLogEntry>,
}

/// A [`LedgerStore`] held entirely in memory.
///
/// A single lock guards all tables, so every append is atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| LedgerError::Internal("memory store lock poisoned".to_string()))
    }

    /// Number of stored artifacts.
    pub fn artifact_count(&self) -> Result<usize> {
        Ok(self.lock()?.artifacts.len())
    }

    /// Direct access to stored records, for tamper tests.
    #[cfg(test)]
    pub(crate) fn with_signatures_mut<F: FnOnce(&mut Vec<SignatureRecord>)>(&self, f: F) {
        let mut tables = self.tables.lock().unwrap();
        f(&mut tables.signatures);
    }
}

impl LedgerStore for MemoryStore {
    async fn insert_identity(&self, identity: NewIdentity) -> Result<Identity> {
        let mut tables = self.lock()?;
        if tables
            .identities
            .values()
            .any(|existing| existing.email.eq_ignore_ascii_case(&identity.email))
        {
            return Err(LedgerError::BadRequest(format!(
                "email '{}' is already registered",
                identity.email
            )));
        }
        let identity = identity.into_identity();
        tables.identities.insert(identity.id, identity.clone());
        Ok(identity)
    }

    async fn get_identity(&self, id: Uuid) -> Result<Option<Identity>> {
        Ok(self.lock()?.identities.get(&id).cloned())
    }

    async fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>> {
        Ok(self
            .lock()?
            .identities
            .values()
            .find(|identity| identity.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn insert_artifact(&self, artifact: NewArtifact) -> Result<Artifact> {
        let artifact = artifact.into_artifact();
        self.lock()?.artifacts.insert(artifact.id, artifact.clone());
        Ok(artifact)
    }

    async fn get_artifact(&self, id: Uuid) -> Result<Option<Artifact>> {
        Ok(self.lock()?.artifacts.get(&id).cloned())
    }

    async fn append_signature(&self, record: NewSignatureRecord) -> Result<SignatureRecord> {
        let mut tables = self.lock()?;

        if !tables.artifacts.contains_key(&record.artifact_id) {
            return Err(LedgerError::NotFound(format!("artifact {}", record.artifact_id)));
        }
        if !tables.identities.contains_key(&record.signer_id) {
            return Err(LedgerError::NotFound(format!("identity {}", record.signer_id)));
        }
        if tables
            .signatures
            .iter()
            .any(|r| r.artifact_id == record.artifact_id && r.signer_id == record.signer_id)
        {
            return Err(LedgerError::DuplicateSignature {
                artifact_id: record.artifact_id,
                signer_id: record.signer_id,
            });
        }

        let prev_digest = tables
            .signatures
            .iter()
            .rev()
            .find(|r| r.artifact_id == record.artifact_id)
            .map(|r| r.record_digest)
            .unwrap_or(GENESIS_DIGEST);

        let sealed = record.seal(prev_digest);
        tables.signatures.push(sealed.clone());
        Ok(sealed)
    }

    async fn get_signature(&self, id: Uuid) -> Result<Option<SignatureRecord>> {
        Ok(self.lock()?.signatures.iter().find(|r| r.id == id).cloned())
    }

    async fn find_signature(
        &self,
        artifact_id: Uuid,
        signer_id: Uuid,
    ) -> Result<Option<SignatureRecord>> {
        Ok(self
            .lock()?
            .signatures
            .iter()
            .find(|r| r.artifact_id == artifact_id && r.signer_id == signer_id)
            .cloned())
    }

    async fn list_signatures(&self, artifact_id: Uuid) -> Result<Vec<SignatureRecord>> {
        Ok(self
            .lock()?
            .signatures
            .iter()
            .filter(|r| r.artifact_id == artifact_id)
            .cloned()
            .collect())
    }

    async fn append_audit(&self, entry: NewAuditLogEntry) -> Result<AuditLogEntry> {
        let entry = entry.into_entry();
        self.lock()?.audit.push(entry.clone());
        Ok(entry)
    }

    async fn list_audit(&self, limit: usize) -> Result<Vec<AuditLogEntry>> {
        Ok(self.lock()?.audit.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use contrasign_crypto::{fingerprint, SignatureAlgorithm};

    fn new_identity(email: &str) -> NewIdentity {
        NewIdentity {
            email: email.to_string(),
            role: Role::Signer,
            algorithm: SignatureAlgorithm::EcdsaSha256,
            public_key_pem: String::new(),
            encrypted_private_key: String::new(),
            credential_hash: String::new(),
        }
    }

    fn new_artifact() -> NewArtifact {
        NewArtifact {
            fingerprint: fingerprint(b"contract"),
            size_bytes: 8,
            media_type: "text/plain".to_string(),
            storage_ref: "uploads/contract.txt".to_string(),
            created_by: None,
        }
    }

    fn new_record(artifact_id: Uuid, signer_id: Uuid) -> NewSignatureRecord {
        NewSignatureRecord {
            artifact_id,
            signer_id,
            algorithm: SignatureAlgorithm::EcdsaSha256,
            signature: vec![1, 2, 3],
            is_valid: true,
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected_case_insensitively() {
        let store = MemoryStore::new();
        store.insert_identity(new_identity("Alice@example.com")).await.unwrap();

        let err = store
            .insert_identity(new_identity("alice@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_append_links_chain_per_artifact() {
        let store = MemoryStore::new();
        let a = store.insert_identity(new_identity("a@example.com")).await.unwrap();
        let b = store.insert_identity(new_identity("b@example.com")).await.unwrap();
        let first = store.insert_artifact(new_artifact()).await.unwrap();
        let second = store.insert_artifact(new_artifact()).await.unwrap();

        let r1 = store.append_signature(new_record(first.id, a.id)).await.unwrap();
        let other = store.append_signature(new_record(second.id, a.id)).await.unwrap();
        let r2 = store.append_signature(new_record(first.id, b.id)).await.unwrap();

        assert_eq!(r1.prev_digest, GENESIS_DIGEST);
        assert_eq!(other.prev_digest, GENESIS_DIGEST);
        assert_eq!(r2.prev_digest, r1.record_digest);

        let listed = store.list_signatures(first.id).await.unwrap();
        assert_eq!(listed, vec![r1, r2]);
    }

    #[tokio::test]
    async fn test_append_rejects_duplicates_and_dangling_ids() {
        let store = MemoryStore::new();
        let signer = store.insert_identity(new_identity("a@example.com")).await.unwrap();
        let artifact = store.insert_artifact(new_artifact()).await.unwrap();

        store.append_signature(new_record(artifact.id, signer.id)).await.unwrap();
        assert!(matches!(
            store.append_signature(new_record(artifact.id, signer.id)).await,
            Err(LedgerError::DuplicateSignature { .. })
        ));
        assert!(matches!(
            store.append_signature(new_record(Uuid::new_v4(), signer.id)).await,
            Err(LedgerError::NotFound(_))
        ));
        assert!(matches!(
            store.append_signature(new_record(artifact.id, Uuid::new_v4())).await,
            Err(LedgerError::NotFound(_))
        ));
        assert_eq!(store.list_signatures(artifact.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_audit_newest_first_with_limit() {
        let store = MemoryStore::new();
        for action in ["identity.register", "artifact.ingest", "artifact.sign"] {
            store
                .append_audit(NewAuditLogEntry::new(None, action, "test"))
                .await
                .unwrap();
        }

        let entries = store.list_audit(2).await.unwrap();
        let actions: Vec<_> = entries.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["artifact.sign", "artifact.ingest"]);
    }
}
