//! Contract status and signing-progress policy.
//!
//! The surrounding application owns contract status; the ledger only
//! consults it before accepting a signature. Progress is derived from the
//! ledger's raw record list by a caller-supplied [`SigningPolicy`].

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::models::SignatureRecord;

/// Lifecycle state of a contract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractStatus {
    #[default]
    Draft,
    Pending,
    Signed,
    Cancelled,
}

impl ContractStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Draft => "draft",
            ContractStatus::Pending => "pending",
            ContractStatus::Signed => "signed",
            ContractStatus::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(&self, next: ContractStatus) -> bool {
        use ContractStatus::*;
        matches!(
            (self, next),
            (Draft, Pending) | (Draft, Cancelled) | (Pending, Signed) | (Pending, Cancelled) | (Pending, Draft)
        )
    }

    /// Moves to `next`, or fails with [`LedgerError::InvalidState`].
    pub fn transition(self, next: ContractStatus) -> Result<ContractStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(LedgerError::InvalidState(format!(
                "cannot move contract from {} to {}",
                self, next
            )))
        }
    }

    /// Signatures may only be attached while pending.
    pub fn accepts_signatures(&self) -> bool {
        matches!(self, ContractStatus::Pending)
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived signing state of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningProgress {
    Unsigned,
    PartiallySigned,
    FullySigned,
}

/// Which signatures an artifact needs before it counts as fully signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningPolicy {
    /// Identities whose signatures are required.
    pub required_signers: Vec<Uuid>,

    /// Whether records that failed verification still count.
    #[serde(default)]
    pub count_invalid: bool,
}

impl SigningPolicy {
    pub fn new(required_signers: Vec<Uuid>) -> Self {
        Self {
            required_signers,
            count_invalid: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.required_signers.is_empty() {
            return Err(LedgerError::BadRequest(
                "signing policy needs at least one required signer".to_string(),
            ));
        }
        let unique: HashSet<_> = self.required_signers.iter().collect();
        if unique.len() != self.required_signers.len() {
            return Err(LedgerError::BadRequest(
                "signing policy lists a signer twice".to_string(),
            ));
        }
        Ok(())
    }

    fn counted_signers(&self, records: &[SignatureRecord]) -> HashSet<Uuid> {
        let required: HashSet<_> = self.required_signers.iter().copied().collect();
        records
            .iter()
            .filter(|r| r.is_valid || self.count_invalid)
            .map(|r| r.signer_id)
            .filter(|id| required.contains(id))
            .collect()
    }

    /// Required signers with no counted record yet, in policy order.
    pub fn missing_signers(&self, records: &[SignatureRecord]) -> Vec<Uuid> {
        let counted = self.counted_signers(records);
        self.required_signers
            .iter()
            .copied()
            .filter(|id| !counted.contains(id))
            .collect()
    }

    pub fn evaluate(&self, records: &[SignatureRecord]) -> SigningProgress {
        let counted = self.counted_signers(records).len();
        if counted == 0 {
            SigningProgress::Unsigned
        } else if counted == self.required_signers.len() {
            SigningProgress::FullySigned
        } else {
            SigningProgress::PartiallySigned
        }
    }
}
