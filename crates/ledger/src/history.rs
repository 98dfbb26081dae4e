//! Node-facing ledger history.
//!
//! [`LedgerHistory`] ties the pieces together: the [`LedgerCache`] holds
//! canonical ledger instances, the [`IndexMap`] remembers which hash the node
//! believes is canonical at each sequence, the [`ConsensusTracker`] pairs
//! built and validated events, and the [`LedgerLoader`] is consulted on
//! cache misses.
//!
//! # Lookup Path
//!
//! ```text
//! get_by_seq ──IndexMap hit──▶ get_by_hash ──cache hit──▶ ledger
//!     │                             │
//!     │ miss                        │ miss
//!     ▼                             ▼
//! loader.load_by_index        loader.load_by_hash
//!     │                             │
//!     └──────▶ retrieve_or_insert ◀─┘
//! ```
//!
//! Loaded ledgers go through [`LedgerCache::retrieve_or_insert`], so two
//! threads missing on the same hash still end up sharing one instance.

use std::sync::Arc;

use ledgerwatch_common::{Clock, Config, Counter, Hash256};
use serde::Serialize;
use tracing::{debug, error};

use crate::cache::{CacheStats, LedgerCache};
use crate::index::IndexMap;
use crate::loader::LedgerLoader;
use crate::mismatch::{Diagnosis, LedgerSource, MismatchAnalyzer};
use crate::tracker::{ConsensusTracker, MismatchInput, TrackOutcome, TrackerStats};
use crate::Ledger;

/// Counters kept by the history.
#[derive(Debug, Default)]
pub struct HistoryMetrics {
    /// Mismatch analyses run.
    pub mismatches: Counter,
    /// Cache misses that went to the loader by hash.
    pub hash_loads: Counter,
    /// Index misses that went to the loader by sequence.
    pub index_loads: Counter,
}

/// Introspection snapshot, see [`LedgerHistory::info`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryInfo {
    /// Ledger cache.
    pub lc: CacheStats,
    /// Consensus/validation tracker.
    pub cv: TrackerStats,
    /// Number of indexed sequences.
    pub lbi: usize,
    pub mismatches: u64,
}

/// Entries dropped by one [`LedgerHistory::sweep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    pub ledgers: usize,
    pub consensus_entries: usize,
}

/// Retains recent ledgers and reconciles built against validated ledgers.
pub struct LedgerHistory {
    ledgers: LedgerCache,
    index: IndexMap,
    consensus: ConsensusTracker,
    loader: Arc<dyn LedgerLoader>,
    metrics: HistoryMetrics,
}

impl LedgerHistory {
    /// Create a history on the real-time clock.
    pub fn new(config: &Config, loader: Arc<dyn LedgerLoader>) -> Self {
        Self::with_clock(config, loader, Arc::new(Clock::real_time()))
    }

    /// Create a history whose cache ages are measured on `clock`.
    pub fn with_clock(config: &Config, loader: Arc<dyn LedgerLoader>, clock: Arc<Clock>) -> Self {
        Self {
            ledgers: LedgerCache::new(
                "LedgerCache",
                config.ledger_cache.max_entries,
                config.ledger_cache.max_age(),
                Arc::clone(&clock),
            ),
            index: IndexMap::new(),
            consensus: ConsensusTracker::new(
                config.consensus_tracker.max_entries,
                config.consensus_tracker.max_age(),
                clock,
            ),
            loader,
            metrics: HistoryMetrics::default(),
        }
    }

    /// Cache a ledger, replacing any instance with the same hash.
    ///
    /// Validated ledgers are also indexed by sequence. Returns `true` if the
    /// hash was already cached.
    ///
    /// # Panics
    ///
    /// Panics if the ledger's hash or state hash is zero.
    pub fn insert(&self, ledger: Arc<Ledger>, validated: bool) -> bool {
        assert!(
            !ledger.hash().is_zero(),
            "invariant violated: inserting ledger {} with zero hash",
            ledger.seq()
        );
        assert!(
            !ledger.state_hash().is_zero(),
            "invariant violated: inserting ledger {} with zero state hash",
            ledger.seq()
        );

        let (seq, hash) = (ledger.seq(), ledger.hash());
        let already_present = self.ledgers.insert_or_assign(ledger);
        if validated {
            self.index.record(seq, hash);
        }
        debug!(seq, hash = %hash, validated, already_present, "Cached ledger");
        already_present
    }

    /// Hash the node believes is canonical at `seq`.
    pub fn ledger_hash(&self, seq: u32) -> Option<Hash256> {
        self.index.lookup(seq)
    }

    /// Cached ledger by hash; never consults the loader.
    pub fn fetch_by_hash(&self, hash: &Hash256) -> Option<Arc<Ledger>> {
        self.ledgers.fetch(hash)
    }

    /// Ledger by hash, loading and caching it on a miss.
    pub fn get_by_hash(&self, hash: &Hash256) -> Option<Arc<Ledger>> {
        if let Some(ledger) = self.ledgers.fetch(hash) {
            return Some(ledger);
        }

        self.metrics.hash_loads.inc();
        let loaded = self.loader.load_by_hash(hash)?;
        if loaded.hash() != *hash {
            error!(
                requested = %hash,
                loaded = %loaded.hash(),
                seq = loaded.seq(),
                "Loader returned a ledger with the wrong hash"
            );
            return None;
        }
        Some(self.ledgers.retrieve_or_insert(loaded))
    }

    /// Ledger at `seq`, via the index when possible.
    ///
    /// On an index miss the loader is asked by sequence; the result is
    /// cached and indexed only if it really is at `seq`.
    pub fn get_by_seq(&self, seq: u32) -> Option<Arc<Ledger>> {
        if let Some(hash) = self.index.lookup(seq) {
            return self.get_by_hash(&hash);
        }

        self.metrics.index_loads.inc();
        let loaded = self.loader.load_by_index(seq)?;
        if loaded.seq() != seq || loaded.hash().is_zero() {
            error!(
                requested = seq,
                loaded = loaded.seq(),
                hash = %loaded.hash(),
                "Loader returned an inconsistent ledger"
            );
            return None;
        }

        let ledger = self.ledgers.retrieve_or_insert(loaded);
        self.index.record(seq, ledger.hash());
        Some(ledger)
    }

    /// Drop cached ledgers below `seq`. Returns the number removed.
    pub fn evict_before(&self, seq: u32) -> usize {
        let removed = self.ledgers.erase_if(|ledger| ledger.seq() < seq);
        debug!(seq, removed, "Cleared ledger cache prior");
        removed
    }

    /// Make sure the index has `hash` at `seq`.
    ///
    /// Returns `false` if a different hash was indexed and has been replaced.
    pub fn fix_index(&self, seq: u32, hash: Hash256) -> bool {
        let consistent = self.index.repair(seq, hash);
        if !consistent {
            debug!(seq, hash = %hash, "Repaired stale index entry");
        }
        consistent
    }

    /// Report a ledger this node built from consensus.
    ///
    /// # Panics
    ///
    /// Panics if the ledger's hash is zero.
    pub fn built_ledger(
        &self,
        ledger: &Ledger,
        consensus_hash: Hash256,
        consensus: serde_json::Value,
    ) -> TrackOutcome {
        assert!(
            !ledger.hash().is_zero(),
            "invariant violated: built ledger {} has zero hash",
            ledger.seq()
        );
        self.consensus.record_built(
            ledger.seq(),
            ledger.hash(),
            consensus_hash,
            consensus,
            |input| self.handle_mismatch(input),
        )
    }

    /// Report a ledger the network validated.
    ///
    /// # Panics
    ///
    /// Panics if the ledger's hash is zero.
    pub fn validated_ledger(
        &self,
        ledger: &Ledger,
        consensus_hash: Option<Hash256>,
    ) -> TrackOutcome {
        assert!(
            !ledger.hash().is_zero(),
            "invariant violated: validated ledger {} has zero hash",
            ledger.seq()
        );
        self.consensus.record_validated(
            ledger.seq(),
            ledger.hash(),
            consensus_hash,
            |input| self.handle_mismatch(input),
        )
    }

    fn handle_mismatch(&self, input: &MismatchInput) -> Diagnosis {
        MismatchAnalyzer::new(self, &self.metrics.mismatches).analyze(input)
    }

    /// Expire aged entries from both caches.
    pub fn sweep(&self) -> SweepReport {
        let report = SweepReport {
            ledgers: self.ledgers.sweep(),
            consensus_entries: self.consensus.sweep(),
        };
        debug!(
            ledgers = report.ledgers,
            consensus_entries = report.consensus_entries,
            "Swept history caches"
        );
        report
    }

    /// Point-in-time occupancy and counters.
    pub fn info(&self) -> HistoryInfo {
        HistoryInfo {
            lc: self.ledgers.stats(),
            cv: self.consensus.stats(),
            lbi: self.index.len(),
            mismatches: self.metrics.mismatches.get(),
        }
    }

    pub fn metrics(&self) -> &HistoryMetrics {
        &self.metrics
    }

    /// The consensus tracker, for inspecting per-sequence state.
    pub fn consensus(&self) -> &ConsensusTracker {
        &self.consensus
    }
}

impl LedgerSource for LedgerHistory {
    fn ledger_by_hash(&self, hash: &Hash256) -> Option<Arc<Ledger>> {
        self.get_by_hash(hash)
    }
}

impl std::fmt::Debug for LedgerHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerHistory")
            .field("ledgers", &self.ledgers)
            .field("consensus", &self.consensus)
            .field("indexed", &self.index.len())
            .finish()
    }
}
