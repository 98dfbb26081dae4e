//! Sequence-to-hash index.
//!
//! The index records the node's current belief of the canonical ledger hash
//! at each sequence. It is a hint for [`crate::LedgerHistory::get_by_seq`],
//! not an authority on content: the ledger cache is. Writes are
//! last-write-wins, and [`IndexMap::repair`] is the one way to correct an
//! entry known to be stale.

use std::collections::HashMap;

use ledgerwatch_common::Hash256;
use parking_lot::Mutex;

/// Mutex-protected map from ledger sequence to ledger hash.
#[derive(Debug, Default)]
pub struct IndexMap {
    by_seq: Mutex<HashMap<u32, Hash256>>,
}

impl IndexMap {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash recorded for `seq`, if any.
    pub fn lookup(&self, seq: u32) -> Option<Hash256> {
        self.by_seq.lock().get(&seq).copied()
    }

    /// Record `hash` as the ledger at `seq`, overwriting any previous entry.
    ///
    /// # Panics
    ///
    /// Panics if `hash` is zero.
    pub fn record(&self, seq: u32, hash: Hash256) {
        assert!(
            !hash.is_zero(),
            "invariant violated: zero hash indexed at seq {}",
            seq
        );
        self.by_seq.lock().insert(seq, hash);
    }

    /// Correct a stale entry.
    ///
    /// If an entry exists for `seq` and differs from `hash`, it is overwritten
    /// and `false` is returned. Otherwise nothing changes and `true` is
    /// returned; a missing entry is not created.
    pub fn repair(&self, seq: u32, hash: Hash256) -> bool {
        let mut by_seq = self.by_seq.lock();
        match by_seq.get_mut(&seq) {
            Some(existing) if *existing != hash => {
                *existing = hash;
                false
            }
            _ => true,
        }
    }

    /// Number of indexed sequences.
    pub fn len(&self) -> usize {
        self.by_seq.lock().len()
    }

    /// Returns `true` if nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.by_seq.lock().is_empty()
    }
}
