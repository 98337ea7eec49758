//! # MedLedger Testkit
//!
//! Testing utilities for MedLedger.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Fixed inputs with the exact signing message, signature and digest they must produce
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: A ledger on an in-memory store with a manual clock, and a store that forces append races
//!
//! ## Golden Vectors
//!
//! ```rust
//! use medledger_testkit::vectors::verify_all_vectors;
//!
//! for (name, matches, out) in verify_all_vectors() {
//!     assert!(matches, "{}: {}", name, out.hash);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use medledger_testkit::generators::{chain_from_params, ChainParams};
//!
//! proptest! {
//!     #[test]
//!     fn chains_are_deterministic(params: ChainParams) {
//!         prop_assert_eq!(chain_from_params(&params), chain_from_params(&params));
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use medledger::Role;
//! use medledger_testkit::fixtures::TestFixture;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let mut fixture = TestFixture::new().await;
//! let clinician = fixture.provision("validator_001", Role::Clinician).await;
//! let block = fixture.append("rec-1", &clinician).await;
//! assert!(block.is_genesis());
//! # });
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{payload_ref, validator_ids, LockstepStore, TestFixture, START_MILLIS};
pub use generators::{chain_from_params, ChainParams, SeedSigner};
pub use vectors::{all_vectors, generate_block_from_vector, verify_all_vectors, GoldenVector};
