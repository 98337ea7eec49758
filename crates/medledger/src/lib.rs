//! # MedLedger
//!
//! A tamper-evident, append-only ledger of medical-record references. Every
//! block is signed by an authorized validator and hash-linked to its
//! predecessor; verification recomputes every hash from storage and reports
//! the first index where the chain stops holding together.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │                  Ledger                   │
//! │   request_append · request_verify · admin │
//! └───────────────────────────────────────────┘
//!          │                     │
//!          ▼                     ▼
//! ┌──────────────────┐  ┌──────────────────┐
//! │ AppendCoordinator│  │ ValidatorRegistry│
//! │  (CAS + retry)   │  │  + Keyring       │
//! └──────────────────┘  └──────────────────┘
//!          │                     │
//!          ▼                     ▼
//! ┌───────────────────────────────────────────┐
//! │        LedgerStore + ValidatorStore       │
//! │          (SQLite or in-memory)            │
//! └───────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use medledger::{Keypair, Ledger, LedgerConfig, PayloadRef, Role, ValidatorId};
//! use medledger::store::SqliteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteStore::open("ledger.db")?;
//! let ledger = Ledger::open(store, LedgerConfig::default()).await?;
//!
//! let clinician = ValidatorId::new("validator_001")?;
//! ledger
//!     .provision_validator(clinician.clone(), Role::Clinician, Keypair::generate())
//!     .await?;
//!
//! let committed = ledger
//!     .request_append(&PayloadRef::new("rec-1")?, &clinician)
//!     .await?;
//! println!("committed block {}", committed.block.index());
//!
//! assert!(ledger.request_verify(None).await?.is_valid());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod ledger;

pub use config::LedgerConfig;
pub use coordinator::{AppendCoordinator, AppendResult, AppendState, Committed};
pub use error::{AppendError, LedgerError, Result};
pub use ledger::{Ledger, VerifyRange, VerifyReport};

// Re-export the component crates
pub use medledger_core as core;
pub use medledger_registry as registry;
pub use medledger_store as store;

// Common types
pub use medledger_core::{
    AuthorizationMode, Block, BlockHash, BreakKind, ChainBreak, ErrorKind, Keypair, PayloadRef,
    Role, ValidatorId, ValidatorStatus, VerifyOutcome,
};
pub use medledger_registry::UnauthorizedReason;
