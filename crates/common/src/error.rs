//! Common error types for ledgerwatch.
//!
//! This module provides the error type [`enum@Error`] and the convenience
//! alias [`Result`] shared by the ledgerwatch crates. Expected absences
//! (a ledger that is not cached or not stored) are modelled as `Option`,
//! never as an error.
//!
//! # Example
//!
//! ```rust
//! use ledgerwatch_common::{Error, Result};
//!
//! fn require_capacity(n: usize) -> Result<()> {
//!     if n == 0 {
//!         return Err(Error::Config("capacity must be non-zero".to_string()));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// A type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for ledgerwatch operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error while reading configuration or data files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be parsed or failed validation.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}
