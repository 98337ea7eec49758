//! # MedLedger Store
//!
//! Persistence for the ledger. The engine never holds the chain in memory; it
//! reads the tail and requested ranges through the [`LedgerStore`] trait and
//! commits new blocks with a compare-and-swap on the [`TailToken`].
//!
//! ## Key Types
//!
//! - [`LedgerStore`] - Async trait for block persistence
//! - [`ValidatorStore`] - Async trait for validator records and status history
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`BlockRecord`] - JSON wire form of a block
//!
//! ## Usage
//!
//! ```rust,no_run
//! use medledger_store::{LedgerStore, SqliteStore};
//!
//! async fn example() {
//!     let store = SqliteStore::open("ledger.db").unwrap();
//!     let (tail, token) = store.get_tail().await.unwrap();
//!     // build a block on `tail`, then:
//!     // store.commit(&block, token).await
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **No engine-level lock**: concurrent appenders race on `commit`; exactly
//!   one wins per tail, the others see `TokenMismatch`.
//! - **Untrusted reads**: stored fields are loaded without validation so that
//!   corruption surfaces in verification, at the exact index.

pub mod error;
pub mod memory;
pub mod migration;
pub mod record;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use record::BlockRecord;
pub use sqlite::SqliteStore;
pub use traits::{CommitResult, LedgerStore, TailToken, ValidatorStore};
