//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Barrier;

use medledger::{Ledger, LedgerConfig};
use medledger_core::{
    Block, Keypair, ManualClock, PayloadRef, Role, StatusChange, ValidatorId, ValidatorRecord,
};
use medledger_registry::Keyring;
use medledger_store::{CommitResult, LedgerStore, MemoryStore, Result, TailToken, ValidatorStore};

/// 2025-01-14T16:00:00Z
pub const START_MILLIS: i64 = 1_736_870_400_000;

/// A ledger over an in-memory store with a hand-driven clock.
pub struct TestFixture<S = MemoryStore> {
    pub ledger: Ledger<S>,
    pub store: Arc<S>,
    pub clock: Arc<ManualClock>,
    next_seed: u8,
}

impl TestFixture<MemoryStore> {
    /// Create a fixture with default configuration.
    pub async fn new() -> Self {
        Self::with_config(LedgerConfig::default()).await
    }

    pub async fn with_config(config: LedgerConfig) -> Self {
        Self::over(MemoryStore::new(), config).await
    }
}

impl<S> TestFixture<S>
where
    S: LedgerStore + ValidatorStore + 'static,
{
    /// Create a fixture over an arbitrary store.
    pub async fn over(store: S, config: LedgerConfig) -> Self {
        let store = Arc::new(store);
        let clock = Arc::new(ManualClock::new(START_MILLIS));
        let ledger = Ledger::open_with(store.clone(), Arc::new(Keyring::new()), clock.clone(), config)
            .await
            .expect("open ledger");
        Self {
            ledger,
            store,
            clock,
            next_seed: 1,
        }
    }

    /// Provision a validator with a deterministic key and hand its key to
    /// the ledger.
    pub async fn provision(&mut self, name: &str, role: Role) -> ValidatorId {
        let id = ValidatorId::new(name).expect("valid validator id");
        let keypair = Keypair::from_seed(&[self.next_seed; 32]);
        self.next_seed = self.next_seed.wrapping_add(1);
        self.ledger
            .provision_validator(id.clone(), role, keypair)
            .await
            .expect("provision validator");
        id
    }

    /// Append `payload` as `validator`, one millisecond after the last event.
    pub async fn append(&self, payload: &str, validator: &ValidatorId) -> Block {
        self.clock.advance(1);
        self.ledger
            .request_append(&payload_ref(payload), validator)
            .await
            .expect("append")
            .block
    }

    /// Advance the clock by `millis`.
    pub fn tick(&self, millis: i64) -> i64 {
        self.clock.advance(millis)
    }
}

/// Shorthand for a valid payload reference.
pub fn payload_ref(s: &str) -> PayloadRef {
    PayloadRef::new(s).expect("valid payload reference")
}

/// Create `count` distinct validator identifiers.
pub fn validator_ids(count: usize) -> Vec<ValidatorId> {
    (0..count)
        .map(|i| ValidatorId::new(format!("validator_{:03}", i + 1)).expect("valid validator id"))
        .collect()
}

/// A store whose first two `get_tail` calls wait for each other.
///
/// Forces two concurrent appenders to read the same tail, so exactly one of
/// them loses the compare-and-swap.
pub struct LockstepStore<S> {
    inner: S,
    barrier: Barrier,
    tail_reads: AtomicUsize,
}

impl<S> LockstepStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            barrier: Barrier::new(2),
            tail_reads: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of `get_tail` calls so far.
    pub fn tail_reads(&self) -> usize {
        self.tail_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: LedgerStore> LedgerStore for LockstepStore<S> {
    async fn get_tail(&self) -> Result<(Option<Block>, TailToken)> {
        let tail = self.inner.get_tail().await?;
        if self.tail_reads.fetch_add(1, Ordering::SeqCst) < 2 {
            self.barrier.wait().await;
        }
        Ok(tail)
    }

    async fn get_range(&self, from: u64, to: u64) -> Result<Vec<Block>> {
        self.inner.get_range(from, to).await
    }

    async fn get_block(&self, index: u64) -> Result<Option<Block>> {
        self.inner.get_block(index).await
    }

    async fn chain_len(&self) -> Result<u64> {
        self.inner.chain_len().await
    }

    async fn commit(&self, block: &Block, expected: TailToken) -> Result<CommitResult> {
        self.inner.commit(block, expected).await
    }
}

#[async_trait]
impl<S: ValidatorStore> ValidatorStore for LockstepStore<S> {
    async fn put_validator(&self, record: &ValidatorRecord) -> Result<()> {
        self.inner.put_validator(record).await
    }

    async fn append_status_change(&self, id: &ValidatorId, change: StatusChange) -> Result<()> {
        self.inner.append_status_change(id, change).await
    }

    async fn load_validators(&self) -> Result<Vec<ValidatorRecord>> {
        self.inner.load_validators().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixture_chain() {
        let mut fixture = TestFixture::new().await;
        let v1 = fixture.provision("validator_001", Role::Clinician).await;

        let b0 = fixture.append("rec-1", &v1).await;
        let b1 = fixture.append("rec-2", &v1).await;

        assert_eq!(b1.previous_hash(), &b0.hash);
        assert_eq!(b1.timestamp(), START_MILLIS + 2);
    }

    #[tokio::test]
    async fn test_distinct_validator_keys() {
        let mut fixture = TestFixture::new().await;
        let v1 = fixture.provision("a", Role::Clinician).await;
        let v2 = fixture.provision("b", Role::Clinician).await;

        let keys = fixture.ledger.keyring();
        assert_ne!(keys.public_key(&v1), keys.public_key(&v2));
    }

    #[test]
    fn test_validator_ids() {
        let ids = validator_ids(3);
        assert_eq!(ids[0].as_str(), "validator_001");
        assert_eq!(ids[2].as_str(), "validator_003");
    }
}
