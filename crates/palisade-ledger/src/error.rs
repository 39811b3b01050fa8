//! Ledger error types.

use thiserror::Error;

/// Errors that can occur in ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// IO error from the storage medium.
    #[error("ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record serialization/deserialization error.
    #[error("ledger serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// A shared lock was poisoned by a panicking holder.
    #[error("ledger lock poisoned")]
    Poisoned,
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
