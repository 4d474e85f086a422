//! Storage interface for identities, artifacts, signature records and the
//! audit log.
//!
//! Components receive a store handle instead of reaching into global state.
//! Two implementations ship: [`MemoryStore`] for tests and embedded use, and
//! [`PgStore`] backed by PostgreSQL.

pub mod memory;
pub mod postgres;

use std::future::Future;

use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Artifact, AuditLogEntry, Identity, NewArtifact, NewAuditLogEntry, NewIdentity,
    NewSignatureRecord, SignatureRecord,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub trait LedgerStore: Send + Sync + 'static {
    /// Persists a new identity. Fails with `BadRequest` if the email is taken.
    fn insert_identity(&self, identity: NewIdentity) -> impl Future<Output = Result<Identity>> + Send;

    fn get_identity(&self, id: Uuid) -> impl Future<Output = Result<Option<Identity>>> + Send;

    fn find_identity_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<Option<Identity>>> + Send;

    fn insert_artifact(&self, artifact: NewArtifact) -> impl Future<Output = Result<Artifact>> + Send;

    fn get_artifact(&self, id: Uuid) -> impl Future<Output = Result<Option<Artifact>>> + Send;

    /// Atomically links `record` to the artifact's chain and appends it.
    ///
    /// Implementations serialize appends per artifact and reject a second
    /// record for the same (artifact, signer) pair with
    /// `DuplicateSignature`. Unknown artifact or signer ids fail with
    /// `NotFound`.
    fn append_signature(
        &self,
        record: NewSignatureRecord,
    ) -> impl Future<Output = Result<SignatureRecord>> + Send;

    fn get_signature(&self, id: Uuid) -> impl Future<Output = Result<Option<SignatureRecord>>> + Send;

    fn find_signature(
        &self,
        artifact_id: Uuid,
        signer_id: Uuid,
    ) -> impl Future<Output = Result<Option<SignatureRecord>>> + Send;

    /// Records for an artifact in append order.
    fn list_signatures(
        &self,
        artifact_id: Uuid,
    ) -> impl Future<Output = Result<Vec<SignatureRecord>>> + Send;

    fn append_audit(
        &self,
        entry: NewAuditLogEntry,
    ) -> impl Future<Output = Result<AuditLogEntry>> + Send;

    /// Most recent entries first.
    fn list_audit(&self, limit: usize) -> impl Future<Output = Result<Vec<AuditLogEntry>>> + Send;
}
