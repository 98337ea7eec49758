//! Error types for the ledger.

use medledger_core::{CoreError, ErrorKind};
use medledger_registry::{RegistryError, UnauthorizedReason};
use medledger_store::StoreError;
use thiserror::Error;

/// Why an append was rejected.
///
/// A rejected append leaves no trace in the chain.
#[derive(Debug, Error)]
pub enum AppendError {
    /// The payload reference is malformed.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The validator may not append.
    #[error("unauthorized: {0}")]
    Unauthorized(UnauthorizedReason),

    /// Every attempt lost the race for the tail.
    #[error("concurrent append conflict after {attempts} attempts")]
    ConcurrentAppendConflict { attempts: u32 },

    /// The store failed; never retried here.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(StoreError),

    /// The store answered, but with data that cannot be used (a corrupt
    /// tail row, an index that does not follow the tail).
    #[error("store rejected append: {0}")]
    Store(StoreError),

    /// The candidate block could not be built.
    #[error("block construction failed: {0}")]
    Block(CoreError),
}

impl AppendError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppendError::InvalidPayload(_) => ErrorKind::InvalidPayload,
            AppendError::Unauthorized(_) => ErrorKind::Unauthorized,
            AppendError::ConcurrentAppendConflict { .. } => ErrorKind::ConcurrentAppendConflict,
            AppendError::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
            AppendError::Store(e) => e.kind(),
            AppendError::Block(e) => e.kind(),
        }
    }
}

impl From<StoreError> for AppendError {
    fn from(e: StoreError) -> Self {
        match e.kind() {
            ErrorKind::StorageUnavailable => AppendError::StorageUnavailable(e),
            _ => AppendError::Store(e),
        }
    }
}

impl From<CoreError> for AppendError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidPayload(msg) | CoreError::InvalidValidatorId(msg) => {
                AppendError::InvalidPayload(msg)
            }
            CoreError::MissingCredential(_) => {
                AppendError::Unauthorized(UnauthorizedReason::NoCredential)
            }
            other => AppendError::Block(other),
        }
    }
}

/// Errors from ledger operations other than append.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Registry error.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Requested range does not lie within the chain.
    #[error("invalid range {from}..={to} for chain of length {len}")]
    InvalidRange { from: u64, to: u64, len: u64 },
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Store(e) => e.kind(),
            LedgerError::Registry(e) => e.kind(),
            LedgerError::Core(e) => e.kind(),
            LedgerError::Config(_) | LedgerError::InvalidRange { .. } => ErrorKind::InvalidRequest,
        }
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
