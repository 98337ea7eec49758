//! # MedLedger Registry
//!
//! Who may extend the ledger.
//!
//! ## Overview
//!
//! The [`ValidatorRegistry`] holds every provisioned validator with its
//! append-only status history. Authorization is evaluated against it at
//! append time; revocation only affects later appends, and the history lets
//! verification ask whether a validator was active when a given block was
//! created.
//!
//! The [`Keyring`] holds validator signing keys and signs blocks on behalf of
//! the identity the caller hands in.
//!
//! ## Key Concepts
//!
//! - **Authorization**: known, active, and holding the `Append` capability
//! - **Status history**: every `Active`/`Revoked` transition, never rewritten
//! - **Point-in-time status**: the status in effect at a block's timestamp
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use medledger_core::{Keypair, Role, ValidatorId, ValidatorStatus};
//! use medledger_registry::{Authorization, Keyring, ValidatorRegistry};
//!
//! let registry = Arc::new(ValidatorRegistry::new());
//! let keyring = Arc::new(Keyring::new());
//!
//! let id = ValidatorId::new("validator_001").unwrap();
//! let keypair = Keypair::generate();
//! registry.provision(id.clone(), keypair.public_key(), Role::Clinician).unwrap();
//! keyring.insert(id.clone(), keypair);
//!
//! assert_eq!(registry.authorize(&id), Authorization::Authorized);
//! registry.record_status(&id, ValidatorStatus::Revoked).unwrap();
//! ```

pub mod error;
pub mod keyring;
pub mod registry;

pub use error::{RegistryError, Result};
pub use keyring::Keyring;
pub use registry::{Authorization, UnauthorizedReason, ValidatorRegistry};
