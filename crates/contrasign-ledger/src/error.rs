//! Error types for the signature ledger and signing service.

use contrasign_crypto::CryptoError;
use uuid::Uuid;

/// Ledger and service error type.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Artifact {artifact_id} already signed by {signer_id}")]
    DuplicateSignature { artifact_id: Uuid, signer_id: Uuid },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid email or password")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

impl LedgerError {
    /// Message safe to show to an end user.
    ///
    /// Storage and internal failures are logged here and replaced by a
    /// generic message.
    pub fn user_message(&self) -> String {
        match self {
            LedgerError::Crypto(CryptoError::Decryption) => "incorrect password".to_string(),
            LedgerError::Crypto(CryptoError::Io(e)) => {
                tracing::warn!("Artifact read failed: {}", e);
                "the document could not be read, please retry".to_string()
            }
            LedgerError::Crypto(CryptoError::KeyGeneration(msg)) => {
                tracing::error!("Key generation error: {}", msg);
                "internal error".to_string()
            }
            LedgerError::Crypto(e) => e.to_string(),
            LedgerError::DuplicateSignature { .. } => "already signed".to_string(),
            LedgerError::Database(e) => {
                tracing::error!("Database error: {}", e);
                "internal error".to_string()
            }
            LedgerError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "internal error".to_string()
            }
            LedgerError::NotFound(msg)
            | LedgerError::Forbidden(msg)
            | LedgerError::InvalidState(msg)
            | LedgerError::BadRequest(msg) => msg.clone(),
            LedgerError::Unauthorized => self.to_string(),
        }
    }

    /// Only failures reading artifact bytes are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Crypto(CryptoError::Io(_)))
    }
}

impl From<tokio::task::JoinError> for LedgerError {
    fn from(e: tokio::task::JoinError) -> Self {
        LedgerError::Internal(format!("blocking task failed: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decryption_surfaces_as_incorrect_password() {
        let err = LedgerError::from(CryptoError::Decryption);
        assert_eq!(err.user_message(), "incorrect password");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_duplicate_surfaces_as_already_signed() {
        let err = LedgerError::DuplicateSignature {
            artifact_id: Uuid::new_v4(),
            signer_id: Uuid::new_v4(),
        };
        assert_eq!(err.user_message(), "already signed");
    }

    #[test]
    fn test_io_is_retryable() {
        let err = LedgerError::from(CryptoError::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "stalled",
        )));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = LedgerError::Internal("pool exhausted at 10.0.0.3".to_string());
        assert_eq!(err.user_message(), "internal error");
    }
}
