//! In-memory implementation of the store traits.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use medledger_core::{Block, StatusChange, ValidatorId, ValidatorRecord};

use crate::error::{Result, StoreError};
use crate::traits::{CommitResult, LedgerStore, TailToken, ValidatorStore};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Committed blocks; position equals index.
    blocks: Vec<Block>,

    /// Validator records in provisioning order.
    validators: Vec<ValidatorRecord>,

    /// Identifier -> position in `validators`.
    validator_index: HashMap<ValidatorId, usize>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {}", e)))
    }

    /// Overwrite a committed block in place, bypassing every check.
    ///
    /// Exists to simulate tampering with the underlying storage.
    pub fn tamper<F>(&self, index: u64, f: F) -> Result<()>
    where
        F: FnOnce(&mut Block),
    {
        let mut inner = self.write()?;
        let block = inner
            .blocks
            .get_mut(index as usize)
            .ok_or_else(|| StoreError::InvalidData(format!("no block at index {}", index)))?;
        f(block);
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn get_tail(&self) -> Result<(Option<Block>, TailToken)> {
        let inner = self.read()?;
        Ok((
            inner.blocks.last().cloned(),
            TailToken(inner.blocks.len() as u64),
        ))
    }

    async fn get_range(&self, from: u64, to: u64) -> Result<Vec<Block>> {
        let inner = self.read()?;
        let len = inner.blocks.len() as u64;
        if from > to || from >= len {
            return Ok(Vec::new());
        }
        let end = to.min(len - 1);
        Ok(inner.blocks[from as usize..=end as usize].to_vec())
    }

    async fn get_block(&self, index: u64) -> Result<Option<Block>> {
        let inner = self.read()?;
        Ok(inner.blocks.get(index as usize).cloned())
    }

    async fn chain_len(&self) -> Result<u64> {
        Ok(self.read()?.blocks.len() as u64)
    }

    async fn commit(&self, block: &Block, expected: TailToken) -> Result<CommitResult> {
        let mut inner = self.write()?;

        let current = TailToken(inner.blocks.len() as u64);
        if current != expected {
            return Ok(CommitResult::TokenMismatch { current });
        }
        if block.index() != expected.next_index() {
            return Err(StoreError::InvalidData(format!(
                "block index {} does not extend chain of length {}",
                block.index(),
                expected.chain_len()
            )));
        }

        inner.blocks.push(block.clone());
        Ok(CommitResult::Committed {
            token: TailToken(inner.blocks.len() as u64),
        })
    }
}

#[async_trait]
impl ValidatorStore for MemoryStore {
    async fn put_validator(&self, record: &ValidatorRecord) -> Result<()> {
        let mut inner = self.write()?;
        if inner.validator_index.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists(record.id.to_string()));
        }
        let position = inner.validators.len();
        inner.validators.push(record.clone());
        inner.validator_index.insert(record.id.clone(), position);
        Ok(())
    }

    async fn append_status_change(&self, id: &ValidatorId, change: StatusChange) -> Result<()> {
        let mut inner = self.write()?;
        let position = *inner
            .validator_index
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        inner.validators[position].record(change);
        Ok(())
    }

    async fn load_validators(&self) -> Result<Vec<ValidatorRecord>> {
        Ok(self.read()?.validators.clone())
    }
}
