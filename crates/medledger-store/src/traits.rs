//! Store traits: the abstract interface for ledger persistence.
//!
//! These traits keep the engine storage-agnostic. Implementations include
//! SQLite (primary) and in-memory (for tests).

use std::fmt;

use async_trait::async_trait;
use medledger_core::{Block, StatusChange, ValidatorId, ValidatorRecord};

use crate::error::Result;

/// Opaque marker of the chain state observed at read time.
///
/// It is the committed chain length, which is also the index the next block
/// must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TailToken(pub u64);

impl TailToken {
    /// Token of the empty chain.
    pub const EMPTY: Self = Self(0);

    /// Number of committed blocks.
    pub fn chain_len(self) -> u64 {
        self.0
    }

    /// Index the next committed block must carry.
    pub fn next_index(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TailToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "len={}", self.0)
    }
}

/// Result of a compare-and-swap commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitResult {
    /// Block is now the tail.
    Committed { token: TailToken },
    /// The chain moved since the token was read; nothing was written.
    TokenMismatch { current: TailToken },
}

/// Block persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, `spawn_blocking` is used internally to avoid blocking the runtime.
///
/// # Design Notes
///
/// - **Compare-and-swap**: `commit` succeeds only if the chain length still
///   equals the expected token, so two appenders that read the same tail can
///   never both commit.
/// - **Short locks**: an implementation may lock for the duration of a
///   single call, never across calls.
/// - **Untrusted reads**: blocks are returned as stored, without rehashing.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// The last committed block (if any) and the matching token.
    async fn get_tail(&self) -> Result<(Option<Block>, TailToken)>;

    /// Blocks with `from <= index <= to`, ordered by index.
    ///
    /// Indices past the tail are simply absent from the result.
    async fn get_range(&self, from: u64, to: u64) -> Result<Vec<Block>>;

    /// A single block by index.
    async fn get_block(&self, index: u64) -> Result<Option<Block>>;

    /// Number of committed blocks.
    async fn chain_len(&self) -> Result<u64>;

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Append `block` if the chain is still at `expected`.
    ///
    /// # Returns
    /// - `Committed` with the new token if the block became the tail.
    /// - `TokenMismatch` with the current token if another append got there first.
    ///
    /// Fails with `InvalidData` if `block.index()` is not `expected.next_index()`.
    async fn commit(&self, block: &Block, expected: TailToken) -> Result<CommitResult>;
}

/// Validator persistence.
///
/// Status history is append-only: entries are never rewritten or removed.
#[async_trait]
pub trait ValidatorStore: Send + Sync {
    /// Persist a newly provisioned validator along with its initial history.
    ///
    /// Fails with `AlreadyExists` if the identifier is taken.
    async fn put_validator(&self, record: &ValidatorRecord) -> Result<()>;

    /// Append one status change to a validator's history.
    ///
    /// Fails with `NotFound` for an unknown identifier.
    async fn append_status_change(&self, id: &ValidatorId, change: StatusChange) -> Result<()>;

    /// Every validator with its full history, in provisioning order.
    async fn load_validators(&self) -> Result<Vec<ValidatorRecord>>;
}

#[async_trait]
impl<T: LedgerStore + ?Sized> LedgerStore for std::sync::Arc<T> {
    async fn get_tail(&self) -> Result<(Option<Block>, TailToken)> {
        (**self).get_tail().await
    }

    async fn get_range(&self, from: u64, to: u64) -> Result<Vec<Block>> {
        (**self).get_range(from, to).await
    }

    async fn get_block(&self, index: u64) -> Result<Option<Block>> {
        (**self).get_block(index).await
    }

    async fn chain_len(&self) -> Result<u64> {
        (**self).chain_len().await
    }

    async fn commit(&self, block: &Block, expected: TailToken) -> Result<CommitResult> {
        (**self).commit(block, expected).await
    }
}

#[async_trait]
impl<T: ValidatorStore + ?Sized> ValidatorStore for std::sync::Arc<T> {
    async fn put_validator(&self, record: &ValidatorRecord) -> Result<()> {
        (**self).put_validator(record).await
    }

    async fn append_status_change(&self, id: &ValidatorId, change: StatusChange) -> Result<()> {
        (**self).append_status_change(id, change).await
    }

    async fn load_validators(&self) -> Result<Vec<ValidatorRecord>> {
        (**self).load_validators().await
    }
}
