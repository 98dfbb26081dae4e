//! Ledger history and consensus reconciliation for ledgerwatch.
//!
//! This crate keeps recently closed ledgers available by hash and by sequence
//! and checks each ledger the node builds against the one the network
//! validates for the same sequence.
//!
//! # Architecture Overview
//!
//! - [`Ledger`]: immutable, content-hashed snapshot, built with
//!   [`LedgerBuilder`] and shared as `Arc<Ledger>`
//! - [`LedgerCache`]: size- and age-bounded cache with one canonical instance
//!   per hash
//! - [`IndexMap`]: sequence to hash hints, with a repair operation for stale
//!   entries
//! - [`ConsensusTracker`]: per-sequence pairing of built and validated hashes
//! - [`MismatchAnalyzer`]: ordered diagnosis of a diverging pair
//! - [`LedgerHistory`]: the facade the rest of a node talks to
//!
//! Durable storage sits behind the [`LedgerLoader`] trait;
//! [`MemoryLedgerStore`] is an in-memory implementation.
//!
//! # Example Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use ledgerwatch_common::{Config, Hash256};
//! use ledgerwatch_ledger::{LedgerBuilder, LedgerHistory, MemoryLedgerStore, TrackOutcome};
//!
//! let store = Arc::new(MemoryLedgerStore::new());
//! let history = LedgerHistory::new(&Config::default(), store);
//!
//! let ledger = Arc::new(LedgerBuilder::new(2, Hash256::hash(b"genesis")).build());
//! history.insert(Arc::clone(&ledger), true);
//!
//! let consensus_set = Hash256::hash(b"txset");
//! history.built_ledger(&ledger, consensus_set, serde_json::Value::Null);
//! let outcome = history.validated_ledger(&ledger, Some(consensus_set));
//! assert_eq!(outcome, TrackOutcome::Matched);
//! ```

mod cache;
mod error;
mod history;
mod index;
mod loader;
pub mod meta;
mod mismatch;
mod snapshot;
mod tracker;

pub use cache::{CacheStats, LedgerCache};
pub use error::LedgerError;
pub use history::{HistoryInfo, HistoryMetrics, LedgerHistory, SweepReport};
pub use index::IndexMap;
pub use loader::{LedgerLoader, MemoryLedgerStore, NullLedgerLoader};
pub use meta::{AffectedNode, NodeAction, TxMeta};
pub use mismatch::{
    ConsensusSetComparison, Diagnosis, LedgerSource, MetaDifference, MismatchAnalyzer,
    TxDiffReport,
};
pub use snapshot::{Ledger, LedgerBuilder, LedgerInfo, DEFAULT_CLOSE_TIME_RESOLUTION};
pub use tracker::{ConsensusEntry, ConsensusTracker, MismatchInput, TrackOutcome, TrackerStats};

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
