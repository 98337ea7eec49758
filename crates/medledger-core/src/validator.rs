//! Validators: the identities allowed to extend the ledger.
//!
//! A validator is provisioned once and never deleted. Its status only moves
//! through explicit transitions, and every transition is appended to its
//! status history so past authorization decisions can be re-derived.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::crypto::Ed25519PublicKey;
use crate::error::CoreError;
use crate::types::ValidatorId;

/// What a validator may currently do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidatorStatus {
    Active,
    Revoked,
}

impl ValidatorStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ValidatorStatus::Active => "active",
            ValidatorStatus::Revoked => "revoked",
        }
    }
}

impl FromStr for ValidatorStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ValidatorStatus::Active),
            "revoked" => Ok(ValidatorStatus::Revoked),
            other => Err(CoreError::MalformedBlock(format!("unknown validator status: {}", other))),
        }
    }
}

/// An action a validator may be permitted to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Extend the chain with new blocks.
    Append,
    /// Run verification over the chain.
    Verify,
    /// Provision validators and change their status.
    Provision,
}

/// The closed set of validator roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Full control, including provisioning.
    Administrator,
    /// Records clinical events; may append and verify.
    Clinician,
    /// Read-only oversight; may verify.
    Auditor,
}

impl Role {
    /// Capabilities carried by this role.
    pub fn capabilities(self) -> &'static [Capability] {
        match self {
            Role::Administrator => &[Capability::Append, Capability::Verify, Capability::Provision],
            Role::Clinician => &[Capability::Append, Capability::Verify],
            Role::Auditor => &[Capability::Verify],
        }
    }

    pub fn has(self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Administrator => "administrator",
            Role::Clinician => "clinician",
            Role::Auditor => "auditor",
        }
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "administrator" => Ok(Role::Administrator),
            "clinician" => Ok(Role::Clinician),
            "auditor" => Ok(Role::Auditor),
            other => Err(CoreError::MalformedBlock(format!("unknown role: {}", other))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in a validator's status history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: ValidatorStatus,
    /// Unix milliseconds from which the status applies.
    pub effective_at: i64,
}

/// Current view of a validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub id: ValidatorId,
    pub public_key: Ed25519PublicKey,
    pub status: ValidatorStatus,
    pub role: Role,
}

impl Validator {
    /// Whether the validator may currently exercise `capability`.
    pub fn can(&self, capability: Capability) -> bool {
        self.status == ValidatorStatus::Active && self.role.has(capability)
    }
}

/// A validator together with its full status history.
///
/// The history is ordered by the sequence in which changes were recorded and
/// always starts with the provisioning entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorRecord {
    pub id: ValidatorId,
    pub public_key: Ed25519PublicKey,
    pub role: Role,
    pub history: Vec<StatusChange>,
}

impl ValidatorRecord {
    /// Provision a new record, active from `provisioned_at`.
    pub fn provision(
        id: ValidatorId,
        public_key: Ed25519PublicKey,
        role: Role,
        provisioned_at: i64,
    ) -> Self {
        Self {
            id,
            public_key,
            role,
            history: vec![StatusChange {
                status: ValidatorStatus::Active,
                effective_at: provisioned_at,
            }],
        }
    }

    /// The most recently recorded status.
    pub fn current_status(&self) -> ValidatorStatus {
        self.history
            .last()
            .map(|c| c.status)
            .unwrap_or(ValidatorStatus::Revoked)
    }

    /// Status in effect at `at` (Unix milliseconds).
    ///
    /// Returns `None` if the validator had not yet been provisioned. Among
    /// changes sharing the same instant, the last recorded one wins.
    pub fn status_at(&self, at: i64) -> Option<ValidatorStatus> {
        self.history
            .iter()
            .filter(|c| c.effective_at <= at)
            .last()
            .map(|c| c.status)
    }

    /// Append a status change.
    pub fn record(&mut self, change: StatusChange) {
        self.history.push(change);
    }

    /// Current view of this validator.
    pub fn to_validator(&self) -> Validator {
        Validator {
            id: self.id.clone(),
            public_key: self.public_key,
            status: self.current_status(),
            role: self.role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;

    fn record() -> ValidatorRecord {
        ValidatorRecord::provision(
            ValidatorId::new("validator_001").unwrap(),
            Keypair::from_seed(&[1; 32]).public_key(),
            Role::Clinician,
            1_000,
        )
    }

    #[test]
    fn test_role_capabilities() {
        assert!(Role::Administrator.has(Capability::Provision));
        assert!(Role::Clinician.has(Capability::Append));
        assert!(!Role::Clinician.has(Capability::Provision));
        assert!(Role::Auditor.has(Capability::Verify));
        assert!(!Role::Auditor.has(Capability::Append));
    }

    #[test]
    fn test_role_string_roundtrip() {
        for role in [Role::Administrator, Role::Clinician, Role::Auditor] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("doctor".parse::<Role>().is_err());
    }

    #[test]
    fn test_status_at_follows_history() {
        let mut rec = record();
        rec.record(StatusChange {
            status: ValidatorStatus::Revoked,
            effective_at: 2_000,
        });
        rec.record(StatusChange {
            status: ValidatorStatus::Active,
            effective_at: 3_000,
        });

        assert_eq!(rec.status_at(999), None);
        assert_eq!(rec.status_at(1_000), Some(ValidatorStatus::Active));
        assert_eq!(rec.status_at(1_999), Some(ValidatorStatus::Active));
        assert_eq!(rec.status_at(2_000), Some(ValidatorStatus::Revoked));
        assert_eq!(rec.status_at(3_500), Some(ValidatorStatus::Active));
        assert_eq!(rec.current_status(), ValidatorStatus::Active);
    }

    #[test]
    fn test_revoked_validator_cannot_append() {
        let mut rec = record();
        assert!(rec.to_validator().can(Capability::Append));

        rec.record(StatusChange {
            status: ValidatorStatus::Revoked,
            effective_at: 1_500,
        });
        let v = rec.to_validator();
        assert_eq!(v.status, ValidatorStatus::Revoked);
        assert!(!v.can(Capability::Append));
    }
}
