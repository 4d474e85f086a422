//! Audit log model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const ACTION_IDENTITY_REGISTER: &str = "identity.register";
pub const ACTION_ARTIFACT_INGEST: &str = "artifact.ingest";
pub const ACTION_ARTIFACT_SIGN: &str = "artifact.sign";
pub const ACTION_ARTIFACT_SIGN_REJECTED: &str = "artifact.sign.rejected";
pub const ACTION_SIGNATURE_VERIFY: &str = "signature.verify";

/// A single audit log line.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditLogEntry {
    pub id: Uuid,
    /// Acting identity, if known.
    pub user_id: Option<Uuid>,
    pub action: String,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Data required to append an audit entry.
#[derive(Debug, Clone)]
pub struct NewAuditLogEntry {
    pub user_id: Option<Uuid>,
    pub action: &'static str,
    pub details: Option<String>,
}

impl NewAuditLogEntry {
    pub fn new(user_id: Option<Uuid>, action: &'static str, details: impl Into<String>) -> Self {
        Self {
            user_id,
            action,
            details: Some(details.into()),
        }
    }

    pub fn into_entry(self) -> AuditLogEntry {
        AuditLogEntry {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            action: self.action.to_string(),
            details: self.details,
            created_at: Utc::now(),
        }
    }
}
