//! Error types for the registry module.

use medledger_core::{ErrorKind, ValidatorId};
use thiserror::Error;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A validator with this identifier is already provisioned.
    #[error("validator already registered: {0}")]
    AlreadyRegistered(ValidatorId),

    /// No validator with this identifier.
    #[error("validator not found: {0}")]
    NotFound(ValidatorId),

    /// Record rejected on load.
    #[error("invalid validator record for {id}: {reason}")]
    InvalidRecord { id: ValidatorId, reason: String },

    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] medledger_core::CoreError),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::AlreadyRegistered(_) => ErrorKind::InvalidRequest,
            RegistryError::NotFound(_) => ErrorKind::Unauthorized,
            RegistryError::InvalidRecord { .. } => ErrorKind::Malformed,
            RegistryError::Core(e) => e.kind(),
        }
    }
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
