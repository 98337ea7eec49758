//! # MedLedger Core
//!
//! Pure primitives for the MedLedger engine: blocks, canonical hashing,
//! validators, and chain verification.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over hash-linked, signed blocks.
//!
//! ## Key Types
//!
//! - [`Block`] - One immutable, hash-linked record in the ledger
//! - [`BlockHash`] - Blake3 digest of a block's canonical form
//! - [`BlockFactory`] - Builds candidate blocks on top of a chain tail
//! - [`ChainValidator`] - Recomputes hashes and links to detect tampering
//! - [`Validator`] - An identity authorized to extend the ledger
//!
//! ## Canonicalization
//!
//! Block headers are encoded using deterministic CBOR. See [`canonical`] module.

pub mod block;
pub mod canonical;
pub mod crypto;
pub mod error;
pub mod time;
pub mod types;
pub mod validator;
pub mod verify;

pub use block::{Block, BlockFactory, BlockHeader, BlockSigner, SignedHeader};
pub use canonical::{canonical_header_bytes, digest, signing_message};
pub use crypto::{Ed25519PublicKey, Ed25519Signature, Keypair};
pub use error::{CoreError, ErrorKind};
pub use time::{Clock, ManualClock, SystemClock};
pub use types::{BlockHash, PayloadRef, ValidatorId, GENESIS_SENTINEL};
pub use validator::{Capability, Role, StatusChange, Validator, ValidatorRecord, ValidatorStatus};
pub use verify::{
    AuthorityView, AuthorizationMode, BreakKind, ChainAnchor, ChainBreak, ChainValidator,
    VerifyOptions, VerifyOutcome, verify_block,
};
