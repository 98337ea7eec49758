//! Error types for MedLedger Core.

use thiserror::Error;

use crate::types::ValidatorId;

/// The closed set of failure categories shared by every MedLedger crate.
///
/// Callers match on this instead of on crate-specific error enums when they
/// only need to decide how to respond (reject, alert an operator, back off).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input, rejected before hashing.
    InvalidPayload,
    /// A request that cannot be served as asked: a range outside the chain,
    /// a bad configuration, a duplicate registration.
    InvalidRequest,
    /// Validator unknown, revoked, or lacking the needed capability.
    Unauthorized,
    /// Recomputed hash disagrees with the stored hash.
    HashMismatch,
    /// `previous_hash` or index discontinuity.
    BrokenLink,
    /// Optimistic-concurrency race that survived every retry.
    ConcurrentAppendConflict,
    /// Persistence layer unreachable or failing.
    StorageUnavailable,
    /// Stored or decoded data could not be interpreted.
    Malformed,
}

/// Core errors that can occur while building or hashing blocks.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid payload reference: {0}")]
    InvalidPayload(String),

    #[error("invalid validator id: {0}")]
    InvalidValidatorId(String),

    #[error("malformed block: {0}")]
    MalformedBlock(String),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("no signing credential for validator {0}")]
    MissingCredential(ValidatorId),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

impl CoreError {
    /// Map this error onto the shared [`ErrorKind`] taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::InvalidPayload(_) | CoreError::InvalidValidatorId(_) => {
                ErrorKind::InvalidPayload
            }
            CoreError::MissingCredential(_) => ErrorKind::Unauthorized,
            CoreError::InvalidSignature | CoreError::InvalidPublicKey => ErrorKind::Unauthorized,
            CoreError::MalformedBlock(_)
            | CoreError::EncodingError(_)
            | CoreError::InvalidHex(_) => ErrorKind::Malformed,
        }
    }
}
