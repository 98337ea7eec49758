//! Validator registry: provisioning, status transitions, authorization.
//!
//! The registry is an explicit instance shared by `Arc`. Its state is the set
//! of [`ValidatorRecord`]s; nothing is ever removed, and status changes are
//! appended to each record's history.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use medledger_core::{
    AuthorityView, Capability, Clock, Ed25519PublicKey, Role, StatusChange, SystemClock,
    Validator, ValidatorId, ValidatorRecord, ValidatorStatus,
};

use crate::error::{RegistryError, Result};

/// Why a validator may not extend the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnauthorizedReason {
    /// No validator with this identifier (or none yet at the instant asked).
    NotFound,
    /// The validator is revoked.
    Revoked,
    /// The validator's role does not carry the required capability.
    MissingCapability,
    /// No signing credential is held for the validator.
    NoCredential,
}

impl fmt::Display for UnauthorizedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnauthorizedReason::NotFound => "validator not found",
            UnauthorizedReason::Revoked => "validator revoked",
            UnauthorizedReason::MissingCapability => "role lacks the append capability",
            UnauthorizedReason::NoCredential => "no signing credential held",
        };
        f.write_str(s)
    }
}

/// Outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Authorized,
    Unauthorized(UnauthorizedReason),
}

impl Authorization {
    pub fn is_authorized(&self) -> bool {
        matches!(self, Authorization::Authorized)
    }

    fn evaluate(
        status: Option<ValidatorStatus>,
        role: Role,
        capability: Capability,
    ) -> Self {
        match status {
            None => Authorization::Unauthorized(UnauthorizedReason::NotFound),
            Some(ValidatorStatus::Revoked) => Authorization::Unauthorized(UnauthorizedReason::Revoked),
            Some(ValidatorStatus::Active) if !role.has(capability) => {
                Authorization::Unauthorized(UnauthorizedReason::MissingCapability)
            }
            Some(ValidatorStatus::Active) => Authorization::Authorized,
        }
    }
}

/// The set of provisioned validators.
pub struct ValidatorRegistry {
    inner: RwLock<RegistryInner>,
    clock: Arc<dyn Clock>,
}

#[derive(Default)]
struct RegistryInner {
    records: HashMap<ValidatorId, ValidatorRecord>,
    /// Provisioning order, for stable listing.
    order: Vec<ValidatorId>,
}

impl RegistryInner {
    fn insert(&mut self, record: ValidatorRecord) -> Result<()> {
        if self.records.contains_key(&record.id) {
            return Err(RegistryError::AlreadyRegistered(record.id));
        }
        self.order.push(record.id.clone());
        self.records.insert(record.id.clone(), record);
        Ok(())
    }
}

impl ValidatorRegistry {
    /// Create an empty registry on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty registry stamping status changes from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            clock,
        }
    }

    /// Rebuild a registry from persisted records.
    pub fn from_records(records: Vec<ValidatorRecord>, clock: Arc<dyn Clock>) -> Result<Self> {
        let registry = Self::with_clock(clock);
        for record in records {
            registry.register(record)?;
        }
        Ok(registry)
    }

    // Lock poisoning only means another thread panicked mid-call; every write
    // here is a single insert or push, so the data is still consistent.
    fn read(&self) -> std::sync::RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a validator record, history included.
    pub fn register(&self, record: ValidatorRecord) -> Result<()> {
        if let Err(e) = record.id.validate() {
            return Err(RegistryError::InvalidRecord {
                id: record.id,
                reason: e.to_string(),
            });
        }
        if record.history.is_empty() {
            return Err(RegistryError::InvalidRecord {
                id: record.id,
                reason: "empty status history".into(),
            });
        }
        self.write().insert(record)
    }

    /// Provision a new validator, active from now.
    pub fn provision(
        &self,
        id: ValidatorId,
        public_key: Ed25519PublicKey,
        role: Role,
    ) -> Result<ValidatorRecord> {
        id.validate()?;
        let record = ValidatorRecord::provision(id, public_key, role, self.clock.now_millis());
        self.write().insert(record.clone())?;
        tracing::info!(validator = %record.id, %role, "validator provisioned");
        Ok(record)
    }

    /// The change `record_status` would append, without applying it.
    ///
    /// Returns `None` if the validator already has that status. The change
    /// takes effect one millisecond after the clock's current reading and
    /// never precedes the last recorded change.
    pub fn plan_status_change(
        &self,
        id: &ValidatorId,
        status: ValidatorStatus,
    ) -> Result<Option<StatusChange>> {
        let inner = self.read();
        let record = inner
            .records
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        Ok(next_change(record, status, self.clock.now_millis()))
    }

    /// Set a validator's status, effective from the next millisecond.
    ///
    /// Has no retroactive effect: the prior history is kept, so blocks the
    /// validator created while active stay valid.
    pub fn record_status(
        &self,
        id: &ValidatorId,
        status: ValidatorStatus,
    ) -> Result<Option<StatusChange>> {
        let mut inner = self.write();
        let record = inner
            .records
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;

        let change = next_change(record, status, self.clock.now_millis());
        if let Some(change) = change {
            record.record(change);
            tracing::info!(
                validator = %id,
                status = status.as_str(),
                effective_at = change.effective_at,
                "validator status changed"
            );
        }
        Ok(change)
    }

    /// Append an already-decided change (e.g. one just persisted).
    pub fn apply_status_change(&self, id: &ValidatorId, change: StatusChange) -> Result<()> {
        let mut inner = self.write();
        let record = inner
            .records
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        record.record(change);
        Ok(())
    }

    /// May `id` append right now?
    pub fn authorize(&self, id: &ValidatorId) -> Authorization {
        self.authorize_capability(id, Capability::Append)
    }

    /// May `id` currently exercise `capability`?
    pub fn authorize_capability(&self, id: &ValidatorId, capability: Capability) -> Authorization {
        let inner = self.read();
        match inner.records.get(id) {
            None => Authorization::Unauthorized(UnauthorizedReason::NotFound),
            Some(record) => {
                Authorization::evaluate(Some(record.current_status()), record.role, capability)
            }
        }
    }

    /// Could `id` append at instant `at`?
    pub fn authorize_at(&self, id: &ValidatorId, at: i64) -> Authorization {
        let inner = self.read();
        match inner.records.get(id) {
            None => Authorization::Unauthorized(UnauthorizedReason::NotFound),
            Some(record) => Authorization::evaluate(record.status_at(at), record.role, Capability::Append),
        }
    }

    /// Status in effect at `at`, or `None` if unknown or not yet provisioned.
    pub fn status_at(&self, id: &ValidatorId, at: i64) -> Option<ValidatorStatus> {
        self.read().records.get(id).and_then(|r| r.status_at(at))
    }

    /// Current view of a validator.
    pub fn get(&self, id: &ValidatorId) -> Option<Validator> {
        self.read().records.get(id).map(ValidatorRecord::to_validator)
    }

    /// A validator's full record.
    pub fn record(&self, id: &ValidatorId) -> Option<ValidatorRecord> {
        self.read().records.get(id).cloned()
    }

    /// Every record, in provisioning order.
    pub fn records(&self) -> Vec<ValidatorRecord> {
        let inner = self.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.records.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ValidatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorRegistry")
            .field("validators", &self.len())
            .finish()
    }
}

impl AuthorityView for ValidatorRegistry {
    fn public_key(&self, id: &ValidatorId) -> Option<Ed25519PublicKey> {
        self.read().records.get(id).map(|r| r.public_key)
    }

    fn status_at(&self, id: &ValidatorId, at: i64) -> Option<ValidatorStatus> {
        ValidatorRegistry::status_at(self, id, at)
    }
}

fn next_change(record: &ValidatorRecord, status: ValidatorStatus, now: i64) -> Option<StatusChange> {
    if record.current_status() == status {
        return None;
    }
    // A change recorded at `now` governs only blocks stamped after `now`.
    let effective_at = now.saturating_add(1);
    let floor = record.history.last().map_or(effective_at, |c| c.effective_at);
    Some(StatusChange {
        status,
        effective_at: effective_at.max(floor),
    })
}
