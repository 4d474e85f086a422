//! Typed caller claims passed into every service entry point.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::identity::Identity;
use crate::error::LedgerError;

/// Role of an authenticated caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Signer,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Signer => "signer",
            Role::Viewer => "viewer",
        }
    }

    /// Whether this role may produce signatures.
    pub fn can_sign(&self) -> bool {
        matches!(self, Role::Admin | Role::Signer)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "signer" => Ok(Role::Signer),
            "viewer" => Ok(Role::Viewer),
            other => Err(LedgerError::BadRequest(format!("unknown role: '{}'", other))),
        }
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Identity id of the caller.
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
}

impl Claims {
    pub fn for_identity(identity: &Identity) -> Self {
        Self {
            sub: identity.id,
            email: identity.email.clone(),
            role: identity.role,
        }
    }

    /// Fails unless the caller may sign as `signer_id`.
    ///
    /// Admins sign as themselves too; nobody signs on behalf of another
    /// identity.
    pub fn ensure_can_sign_as(&self, signer_id: Uuid) -> Result<(), LedgerError> {
        if !self.role.can_sign() {
            return Err(LedgerError::Forbidden(format!(
                "role '{}' may not sign documents",
                self.role
            )));
        }
        if self.sub != signer_id {
            return Err(LedgerError::Forbidden(
                "cannot sign on behalf of another identity".to_string(),
            ));
        }
        Ok(())
    }
}
