//! The Ledger: unified API for MedLedger.
//!
//! Brings the store, the validator registry, the keyring and the append
//! coordinator together behind one handle, meant to be shared via `Arc`.

use std::sync::Arc;

use tokio::sync::Mutex;

use medledger_core::{
    AuthorityView, Block, BlockHash, ChainAnchor, ChainValidator, Clock, Ed25519PublicKey,
    Keypair, PayloadRef, Role, StatusChange, SystemClock, Validator, ValidatorId,
    ValidatorRecord, ValidatorStatus, VerifyOutcome,
};
use medledger_registry::{Keyring, RegistryError, ValidatorRegistry};
use medledger_store::{LedgerStore, StoreError, ValidatorStore};

use crate::config::LedgerConfig;
use crate::coordinator::{AppendCoordinator, AppendResult};
use crate::error::{LedgerError, Result};

/// Portion of the chain to verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyRange {
    /// First index to verify.
    pub from: u64,
    /// Last index to verify, inclusive. `None` means the tail at call time.
    pub to: Option<u64>,
    /// Hash of block `from - 1` to anchor against. When absent the stored
    /// hash of that block is trusted.
    pub checkpoint: Option<BlockHash>,
}

impl VerifyRange {
    /// Everything from `from` to the current tail.
    pub fn from(from: u64) -> Self {
        Self {
            from,
            to: None,
            checkpoint: None,
        }
    }

    /// The blocks after a trusted checkpoint.
    pub fn after_checkpoint(index: u64, hash: BlockHash) -> Self {
        Self {
            from: index.saturating_add(1),
            to: None,
            checkpoint: Some(hash),
        }
    }
}

/// Result of [`Ledger::request_verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub outcome: VerifyOutcome,
    /// First index examined.
    pub from: u64,
    /// Number of blocks examined.
    pub checked: u64,
    /// Last verified position, usable as the checkpoint of a later run.
    /// Only set when the outcome is valid and the run ended on a block, either
    /// one it checked or the anchor of an empty suffix.
    pub checkpoint: Option<(u64, BlockHash)>,
}

impl VerifyReport {
    pub fn is_valid(&self) -> bool {
        self.outcome.is_valid()
    }
}

/// A medical-record ledger.
///
/// Provides a unified API for:
/// - Appending blocks on behalf of validators
/// - Verifying the whole chain or a suffix of it
/// - Provisioning validators and changing their status
/// - Reading blocks
pub struct Ledger<S> {
    store: Arc<S>,
    registry: Arc<ValidatorRegistry>,
    keyring: Arc<Keyring>,
    coordinator: AppendCoordinator<S>,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
    /// Serializes provisioning and status changes so the registry and the
    /// store record them in the same order.
    admin: Mutex<()>,
}

impl<S> Ledger<S>
where
    S: LedgerStore + ValidatorStore + 'static,
{
    /// Open a ledger on `store` with the system clock and an empty keyring.
    pub async fn open(store: S, config: LedgerConfig) -> Result<Self> {
        Self::open_with(Arc::new(store), Arc::new(Keyring::new()), Arc::new(SystemClock), config)
            .await
    }

    /// Open a ledger with explicit collaborators.
    ///
    /// The registry is rebuilt from the validators persisted in `store`.
    pub async fn open_with(
        store: Arc<S>,
        keyring: Arc<Keyring>,
        clock: Arc<dyn Clock>,
        config: LedgerConfig,
    ) -> Result<Self> {
        config.validate()?;

        let records = store.load_validators().await?;
        let count = records.len();
        let registry = Arc::new(ValidatorRegistry::from_records(records, clock.clone())?);
        tracing::info!(validators = count, "ledger opened");

        let coordinator = AppendCoordinator::new(
            store.clone(),
            registry.clone(),
            keyring.clone(),
            clock.clone(),
            config.clone(),
        );

        Ok(Self {
            store,
            registry,
            keyring,
            coordinator,
            clock,
            config,
            admin: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ValidatorRegistry> {
        &self.registry
    }

    pub fn keyring(&self) -> &Arc<Keyring> {
        &self.keyring
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Chain Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Append a block referencing `payload_ref`, signed as `validator_id`.
    ///
    /// The caller's identity is trusted as given.
    pub async fn request_append(
        &self,
        payload_ref: &PayloadRef,
        validator_id: &ValidatorId,
    ) -> AppendResult {
        self.coordinator.append(payload_ref, validator_id).await
    }

    /// Verify the chain, or the part of it selected by `range`.
    ///
    /// Blocks are fetched in batches of `verify_batch_size`; only the last
    /// accepted index and hash are carried between batches. Appends that
    /// land while verification runs are outside the verified range.
    pub async fn request_verify(&self, range: Option<VerifyRange>) -> Result<VerifyReport> {
        let range = range.unwrap_or(VerifyRange::from(0));
        let len = self.store.chain_len().await?;

        let to = match range.to {
            Some(to) => to,
            None if len == 0 => {
                return Ok(VerifyReport {
                    outcome: VerifyOutcome::Valid,
                    from: range.from,
                    checked: 0,
                    checkpoint: None,
                })
            }
            None if range.from == len => return self.verify_empty_suffix(&range).await,
            None => len - 1,
        };
        if range.from > to || to >= len {
            return Err(LedgerError::InvalidRange {
                from: range.from,
                to,
                len,
            });
        }

        let anchor = self.anchor_for(&range).await?;
        let mut validator = ChainValidator::new(anchor, self.config.verify_options());
        let authority: &dyn AuthorityView = self.registry.as_ref();

        let batch = self.config.verify_batch_size.max(1);
        let mut cursor = range.from;
        while cursor <= to {
            let batch_end = cursor.saturating_add(batch - 1).min(to);
            let blocks = self.store.get_range(cursor, batch_end).await?;
            tracing::debug!(from = cursor, to = batch_end, fetched = blocks.len(), "verifying batch");

            if blocks.is_empty() {
                return Err(StoreError::InvalidData(format!(
                    "no blocks in {}..={} of a chain of length {}",
                    cursor, batch_end, len
                ))
                .into());
            }
            if !validator.feed(&blocks, Some(authority)) {
                break;
            }
            match batch_end.checked_add(1) {
                Some(next) => cursor = next,
                None => break,
            }
        }

        let checked = validator.checked();
        let carried = validator.anchor();
        let outcome = validator.finish();

        let checkpoint = match (&outcome, carried) {
            (VerifyOutcome::Valid, ChainAnchor::Checkpoint { index, hash }) if checked > 0 => {
                Some((index, hash))
            }
            _ => None,
        };

        match &outcome {
            VerifyOutcome::Valid => {
                tracing::info!(from = range.from, checked, "chain verified")
            }
            VerifyOutcome::Invalid {
                first_bad_index,
                breaks,
            } => {
                for b in breaks {
                    tracing::warn!(index = b.index, kind = %b.kind, detail = %b.detail, "chain break");
                }
                tracing::warn!(first_bad_index, breaks = breaks.len(), "chain verification failed");
            }
        }

        Ok(VerifyReport {
            outcome,
            from: range.from,
            checked,
            checkpoint,
        })
    }

    /// Nothing follows the anchor: the chain has not grown since `range.from - 1`.
    async fn verify_empty_suffix(&self, range: &VerifyRange) -> Result<VerifyReport> {
        let checkpoint = match self.anchor_for(range).await? {
            ChainAnchor::Checkpoint { index, hash } => Some((index, hash)),
            ChainAnchor::Genesis { .. } => None,
        };
        tracing::info!(from = range.from, checked = 0, "chain verified");
        Ok(VerifyReport {
            outcome: VerifyOutcome::Valid,
            from: range.from,
            checked: 0,
            checkpoint,
        })
    }

    async fn anchor_for(&self, range: &VerifyRange) -> Result<ChainAnchor> {
        if range.from == 0 {
            return Ok(ChainAnchor::Genesis {
                expected_genesis_hash: self.config.genesis_hash()?,
            });
        }

        let prior = range.from - 1;
        let hash = match range.checkpoint {
            Some(hash) => hash,
            None => match self.store.get_block(prior).await? {
                Some(block) => block.hash,
                None => {
                    return Err(LedgerError::InvalidRange {
                        from: range.from,
                        to: range.to.unwrap_or(prior),
                        len: self.store.chain_len().await?,
                    })
                }
            },
        };
        Ok(ChainAnchor::Checkpoint { index: prior, hash })
    }

    /// The current tail block.
    pub async fn tail(&self) -> Result<Option<Block>> {
        Ok(self.store.get_tail().await?.0)
    }

    /// Blocks with `from <= index <= to`.
    pub async fn blocks(&self, from: u64, to: u64) -> Result<Vec<Block>> {
        Ok(self.store.get_range(from, to).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Validator Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Provision a validator whose signing key the ledger holds.
    pub async fn provision_validator(
        &self,
        id: ValidatorId,
        role: Role,
        keypair: Keypair,
    ) -> Result<Validator> {
        let validator = self.register_validator(id.clone(), keypair.public_key(), role).await?;
        self.keyring.insert(id, keypair);
        Ok(validator)
    }

    /// Provision a validator by public key only.
    ///
    /// Blocks it signed elsewhere verify, but the ledger cannot append on
    /// its behalf.
    pub async fn register_validator(
        &self,
        id: ValidatorId,
        public_key: Ed25519PublicKey,
        role: Role,
    ) -> Result<Validator> {
        let _guard = self.admin.lock().await;

        id.validate()?;
        if self.registry.get(&id).is_some() {
            return Err(RegistryError::AlreadyRegistered(id).into());
        }
        let record = ValidatorRecord::provision(id, public_key, role, self.clock.now_millis());
        self.store.put_validator(&record).await?;
        self.registry.register(record.clone())?;

        tracing::info!(validator = %record.id, %role, "validator provisioned");
        Ok(record.to_validator())
    }

    /// Change a validator's status, effective immediately and never
    /// retroactively. Returns `None` if the status was already in effect.
    pub async fn set_validator_status(
        &self,
        id: &ValidatorId,
        status: ValidatorStatus,
    ) -> Result<Option<StatusChange>> {
        let _guard = self.admin.lock().await;

        let Some(change) = self.registry.plan_status_change(id, status)? else {
            return Ok(None);
        };
        self.store.append_status_change(id, change).await?;
        self.registry.apply_status_change(id, change)?;

        tracing::info!(
            validator = %id,
            status = status.as_str(),
            effective_at = change.effective_at,
            "validator status changed"
        );
        Ok(Some(change))
    }

    /// A validator's current view.
    pub fn validator(&self, id: &ValidatorId) -> Option<Validator> {
        self.registry.get(id)
    }

    /// Every validator with its status history.
    pub fn validators(&self) -> Vec<ValidatorRecord> {
        self.registry.records()
    }
}
