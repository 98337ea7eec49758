//! Error types for the store module.

use medledger_core::ErrorKind;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The backend cannot serve requests (poisoned lock, lost worker thread).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Wire or row encoding error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Stored data that cannot be represented.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Validator record already present.
    #[error("validator already exists: {0}")]
    AlreadyExists(String),

    /// Validator record not present.
    #[error("validator not found: {0}")]
    NotFound(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Database(_)
            | StoreError::Unavailable(_)
            | StoreError::Migration(_)
            | StoreError::Io(_) => ErrorKind::StorageUnavailable,
            StoreError::Serialization(_) | StoreError::InvalidData(_) => ErrorKind::Malformed,
            StoreError::AlreadyExists(_) | StoreError::NotFound(_) => ErrorKind::InvalidRequest,
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
