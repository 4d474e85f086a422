//! Artifact model: an ingested document identified by its content.

use chrono::{DateTime, Utc};
use contrasign_crypto::Fingerprint;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An ingested artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    /// SHA-256 of the artifact bytes, fixed at ingestion.
    pub fingerprint: Fingerprint,
    pub size_bytes: u64,
    pub media_type: String,
    /// Location of the bytes in the external blob store.
    pub storage_ref: String,
    /// Identity that uploaded the artifact.
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Data required to create a new artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewArtifact {
    pub fingerprint: Fingerprint,
    pub size_bytes: u64,
    pub media_type: String,
    pub storage_ref: String,
    pub created_by: Option<Uuid>,
}

impl NewArtifact {
    pub fn into_artifact(self) -> Artifact {
        Artifact {
            id: Uuid::new_v4(),
            fingerprint: self.fingerprint,
            size_bytes: self.size_bytes,
            media_type: self.media_type,
            storage_ref: self.storage_ref,
            created_by: self.created_by,
            created_at: Utc::now(),
        }
    }
}

impl Artifact {
    /// Hex form of the fingerprint, as handed to the surrounding application.
    pub fn fingerprint_hex(&self) -> String {
        self.fingerprint.to_hex()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contrasign_crypto::fingerprint;

    #[test]
    fn test_artifact_fingerprint_hex() {
        let artifact = NewArtifact {
            fingerprint: fingerprint(b"hello world"),
            size_bytes: 11,
            media_type: "text/plain".to_string(),
            storage_ref: "uploads/hello.txt".to_string(),
            created_by: None,
        }
        .into_artifact();

        assert_eq!(
            artifact.fingerprint_hex(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }
}
