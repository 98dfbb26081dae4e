//! Common types and utilities for ledgerwatch.
//!
//! This crate provides the shared building blocks used by the ledger history
//! and overlay crates:
//!
//! - [`Hash256`]: the 256-bit digest used for ledger, transaction and
//!   consensus-set identities
//! - [`Config`]: TOML-backed configuration for cache sizing, overlay
//!   compression and logging
//! - [`Clock`]: a monotonic clock that can run in real or virtual time, so
//!   age-based eviction can be tested deterministically
//! - [`Counter`]: atomic counters used as the metrics sink

pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

pub use clock::{Clock, ClockMode};
pub use config::Config;
pub use error::{Error, Result};
pub use metrics::Counter;
pub use types::Hash256;
