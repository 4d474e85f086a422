//! The signature ledger: append-only signature records per artifact.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use contrasign_crypto::{verify_fingerprint, SignatureAlgorithm};
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::models::{chain_is_intact, NewSignatureRecord, SignatureRecord};
use crate::store::LedgerStore;

type ArtifactLock = Arc<tokio::sync::Mutex<()>>;

/// Appends and lists signature records.
///
/// Appends for one artifact are serialized in-process by a per-artifact
/// mutex; the store's own atomic append covers other processes.
pub struct SignatureLedger<S> {
    store: Arc<S>,
    locks: Mutex<HashMap<Uuid, ArtifactLock>>,
}

impl<S: LedgerStore> SignatureLedger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn acquire_slot(&self, artifact_id: Uuid) -> Result<ArtifactLock> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| LedgerError::Internal("ledger lock table poisoned".to_string()))?;
        Ok(locks.entry(artifact_id).or_default().clone())
    }

    fn release_slot(&self, artifact_id: Uuid) {
        if let Ok(mut locks) = self.locks.lock() {
            if locks
                .get(&artifact_id)
                .is_some_and(|lock| Arc::strong_count(lock) == 1)
            {
                locks.remove(&artifact_id);
            }
        }
    }

    /// Verifies `signature` against the signer's stored key and the
    /// artifact's stored fingerprint, then appends the record.
    ///
    /// A signature that parses but does not verify is still appended with
    /// `is_valid = false`. Unparseable input is rejected and nothing is
    /// written. A second record for the same (artifact, signer) pair fails
    /// with [`LedgerError::DuplicateSignature`].
    pub async fn record_signature(
        &self,
        artifact_id: Uuid,
        signer_id: Uuid,
        algorithm: SignatureAlgorithm,
        signature: Vec<u8>,
    ) -> Result<SignatureRecord> {
        let artifact = self
            .store
            .get_artifact(artifact_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("artifact {}", artifact_id)))?;
        let signer = self
            .store
            .get_identity(signer_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("identity {}", signer_id)))?;

        let is_valid = verify_fingerprint(
            &artifact.fingerprint,
            &signature,
            &signer.public_key_pem,
            algorithm,
        )?;

        let slot = self.acquire_slot(artifact_id)?;
        let result = {
            let _guard = slot.lock().await;
            self.append_locked(NewSignatureRecord {
                artifact_id,
                signer_id,
                algorithm,
                signature,
                is_valid,
            })
            .await
        };
        drop(slot);
        self.release_slot(artifact_id);

        match &result {
            Ok(record) if record.is_valid => tracing::info!(
                record_id = %record.id,
                %artifact_id,
                %signer_id,
                %algorithm,
                "Signature recorded"
            ),
            Ok(record) => tracing::warn!(
                record_id = %record.id,
                %artifact_id,
                %signer_id,
                %algorithm,
                "Signature recorded but did not verify"
            ),
            Err(LedgerError::DuplicateSignature { .. }) => {
                tracing::warn!(%artifact_id, %signer_id, "Rejected duplicate signature")
            }
            Err(e) => tracing::error!(%artifact_id, %signer_id, "Failed to record signature: {}", e),
        }
        result
    }

    async fn append_locked(&self, record: NewSignatureRecord) -> Result<SignatureRecord> {
        if self
            .store
            .find_signature(record.artifact_id, record.signer_id)
            .await?
            .is_some()
        {
            return Err(LedgerError::DuplicateSignature {
                artifact_id: record.artifact_id,
                signer_id: record.signer_id,
            });
        }
        self.store.append_signature(record).await
    }

    /// Whether `signer_id` already has a record for `artifact_id`.
    pub async fn has_signed(&self, artifact_id: Uuid, signer_id: Uuid) -> Result<bool> {
        Ok(self
            .store
            .find_signature(artifact_id, signer_id)
            .await?
            .is_some())
    }

    /// Records for an artifact, oldest first.
    pub async fn list_signatures(&self, artifact_id: Uuid) -> Result<Vec<SignatureRecord>> {
        let mut records = self.store.list_signatures(artifact_id).await?;
        records.sort_by_key(|r| r.signed_at);
        Ok(records)
    }

    /// Recomputes the record chain of an artifact. Returns `false` if any
    /// record was altered, removed or reordered.
    pub async fn verify_chain(&self, artifact_id: Uuid) -> Result<bool> {
        let records = self.store.list_signatures(artifact_id).await?;
        let intact = chain_is_intact(&records);
        if !intact {
            tracing::warn!(%artifact_id, records = records.len(), "Signature chain is broken");
        }
        Ok(intact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Identity, NewArtifact, NewIdentity, Role};
    use crate::store::MemoryStore;
    use contrasign_crypto::{fingerprint, generate_keypair, sign_fingerprint, KeyPair};

    struct Fixture {
        ledger: Arc<SignatureLedger<MemoryStore>>,
        signer: Identity,
        keys: KeyPair,
        artifact_id: Uuid,
    }

    async fn add_signer(store: &MemoryStore, email: &str) -> (Identity, KeyPair) {
        let keys = generate_keypair(SignatureAlgorithm::EcdsaSha256).unwrap();
        let identity = store
            .insert_identity(NewIdentity {
                email: email.to_string(),
                role: Role::Signer,
                algorithm: SignatureAlgorithm::EcdsaSha256,
                public_key_pem: keys.public_key_pem.clone(),
                encrypted_private_key: String::new(),
                credential_hash: String::new(),
            })
            .await
            .unwrap();
        (identity, keys)
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let (signer, keys) = add_signer(&store, "alice@example.com").await;
        let artifact = store
            .insert_artifact(NewArtifact {
                fingerprint: fingerprint(b"master services agreement"),
                size_bytes: 25,
                media_type: "text/plain".to_string(),
                storage_ref: "uploads/msa.txt".to_string(),
                created_by: Some(signer.id),
            })
            .await
            .unwrap();

        Fixture {
            ledger: Arc::new(SignatureLedger::new(store)),
            signer,
            keys,
            artifact_id: artifact.id,
        }
    }

    fn sign(keys: &KeyPair, content: &[u8]) -> Vec<u8> {
        sign_fingerprint(&fingerprint(content), &keys.private_key, SignatureAlgorithm::EcdsaSha256)
            .unwrap()
    }

    #[tokio::test]
    async fn test_valid_signature_is_recorded() {
        let f = fixture().await;
        let record = f
            .ledger
            .record_signature(
                f.artifact_id,
                f.signer.id,
                SignatureAlgorithm::EcdsaSha256,
                sign(&f.keys, b"master services agreement"),
            )
            .await
            .unwrap();

        assert!(record.is_valid);
        assert_eq!(f.ledger.list_signatures(f.artifact_id).await.unwrap(), vec![record]);
        assert!(f.ledger.has_signed(f.artifact_id, f.signer.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_mismatched_signature_is_persisted_as_invalid() {
        let f = fixture().await;
        let record = f
            .ledger
            .record_signature(
                f.artifact_id,
                f.signer.id,
                SignatureAlgorithm::EcdsaSha256,
                sign(&f.keys, b"some other document"),
            )
            .await
            .unwrap();

        assert!(!record.is_valid);
        assert_eq!(f.ledger.list_signatures(f.artifact_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_signature_writes_nothing() {
        let f = fixture().await;
        let err = f
            .ledger
            .record_signature(
                f.artifact_id,
                f.signer.id,
                SignatureAlgorithm::EcdsaSha256,
                b"not a DER signature".to_vec(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::Crypto(_)));
        assert!(f.ledger.list_signatures(f.artifact_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_artifact_is_not_found() {
        let f = fixture().await;
        let err = f
            .ledger
            .record_signature(
                Uuid::new_v4(),
                f.signer.id,
                SignatureAlgorithm::EcdsaSha256,
                sign(&f.keys, b"master services agreement"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicates_yield_one_record() {
        let f = fixture().await;
        let signature = sign(&f.keys, b"master services agreement");

        let attempts: Vec<_> = (0..2)
            .map(|_| {
                let ledger = Arc::clone(&f.ledger);
                let signature = signature.clone();
                let (artifact_id, signer_id) = (f.artifact_id, f.signer.id);
                tokio::spawn(async move {
                    ledger
                        .record_signature(artifact_id, signer_id, SignatureAlgorithm::EcdsaSha256, signature)
                        .await
                })
            })
            .collect();

        let mut ok = 0;
        let mut duplicates = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => ok += 1,
                Err(LedgerError::DuplicateSignature { artifact_id, signer_id }) => {
                    assert_eq!((artifact_id, signer_id), (f.artifact_id, f.signer.id));
                    duplicates += 1;
                }
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        assert_eq!((ok, duplicates), (1, 1));
        assert_eq!(f.ledger.list_signatures(f.artifact_id).await.unwrap().len(), 1);
        assert!(f.ledger.locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_records_are_listed_oldest_first() {
        let f = fixture().await;
        let (bob, bob_keys) = add_signer(f.ledger.store(), "bob@example.com").await;
        let content = b"master services agreement";

        let first = f
            .ledger
            .record_signature(f.artifact_id, f.signer.id, SignatureAlgorithm::EcdsaSha256, sign(&f.keys, content))
            .await
            .unwrap();
        let second = f
            .ledger
            .record_signature(f.artifact_id, bob.id, SignatureAlgorithm::EcdsaSha256, sign(&bob_keys, content))
            .await
            .unwrap();

        let listed = f.ledger.list_signatures(f.artifact_id).await.unwrap();
        assert_eq!(listed, vec![first, second]);
        assert!(f.ledger.verify_chain(f.artifact_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_chain_detects_tampering() {
        let f = fixture().await;
        let (bob, bob_keys) = add_signer(f.ledger.store(), "bob@example.com").await;
        let content = b"master services agreement";
        for (id, keys) in [(f.signer.id, &f.keys), (bob.id, &bob_keys)] {
            f.ledger
                .record_signature(f.artifact_id, id, SignatureAlgorithm::EcdsaSha256, sign(keys, content))
                .await
                .unwrap();
        }
        assert!(f.ledger.verify_chain(f.artifact_id).await.unwrap());

        f.ledger.store().with_signatures_mut(|records| records[0].is_valid = false);
        assert!(!f.ledger.verify_chain(f.artifact_id).await.unwrap());

        f.ledger.store().with_signatures_mut(|records| {
            records[0].is_valid = true;
            records.remove(0);
        });
        assert!(!f.ledger.verify_chain(f.artifact_id).await.unwrap());
    }
}
