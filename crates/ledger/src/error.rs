//! Error types for ledger operations.
//!
//! Lookups that find nothing return `None`; these errors cover malformed
//! input only.

use thiserror::Error;

/// Errors that can occur while decoding ledgers or transaction metadata.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A transaction key appeared more than once in one ledger.
    #[error("duplicate transaction key: {0}")]
    DuplicateTransaction(String),

    /// The stored hash does not match the ledger contents.
    #[error("ledger hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    /// Low-level I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
