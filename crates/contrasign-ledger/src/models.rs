//! Persisted records owned by the signing core.

pub mod artifact;
pub mod audit_log;
pub mod claims;
pub mod identity;
pub mod signature_record;

pub use artifact::{Artifact, NewArtifact};
pub use audit_log::{AuditLogEntry, NewAuditLogEntry};
pub use claims::{Claims, Role};
pub use identity::{Identity, NewIdentity};
pub use signature_record::{
    chain_is_intact, NewSignatureRecord, RecordDigest, SignatureRecord, GENESIS_DIGEST,
};
