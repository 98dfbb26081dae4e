//! Durable ledger store interface.
//!
//! The history consults a [`LedgerLoader`] whenever a ledger is not cached.
//! Loads may block on I/O; "not found" is always `None`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use ledgerwatch_common::{Counter, Hash256};
use parking_lot::RwLock;

use crate::{Ledger, Result};

/// Lookup of persisted ledgers.
///
/// Each successful load returns a freshly materialized instance; the ledger
/// cache decides which instance becomes canonical.
pub trait LedgerLoader: Send + Sync {
    /// Load the ledger with the given hash.
    fn load_by_hash(&self, hash: &Hash256) -> Option<Arc<Ledger>>;

    /// Load the ledger the store considers canonical at `seq`.
    fn load_by_index(&self, seq: u32) -> Option<Arc<Ledger>>;
}

/// A loader with nothing in it.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLedgerLoader;

impl LedgerLoader for NullLedgerLoader {
    fn load_by_hash(&self, _hash: &Hash256) -> Option<Arc<Ledger>> {
        None
    }

    fn load_by_index(&self, _seq: u32) -> Option<Arc<Ledger>> {
        None
    }
}

/// Thread-safe in-memory ledger store.
///
/// Every load clones the stored ledger into a new `Arc`, the same way a
/// database-backed store would deserialize a new object per query. Load
/// counts are kept so callers can tell whether the store was consulted.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    by_hash: DashMap<Hash256, Ledger>,
    by_index: RwLock<HashMap<u32, Hash256>>,
    hash_loads: Counter,
    index_loads: Counter,
}

impl MemoryLedgerStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a ledger and mark it canonical for its sequence.
    pub fn insert(&self, ledger: Ledger) {
        self.by_index.write().insert(ledger.seq(), ledger.hash());
        self.by_hash.insert(ledger.hash(), ledger);
    }

    /// Store a ledger reachable by hash only (e.g. a fork).
    pub fn insert_by_hash(&self, ledger: Ledger) {
        self.by_hash.insert(ledger.hash(), ledger);
    }

    /// Point `seq` at an arbitrary stored hash.
    pub fn set_index(&self, seq: u32, hash: Hash256) {
        self.by_index.write().insert(seq, hash);
    }

    /// Load every `*.json` ledger file in a directory.
    ///
    /// Returns the number of ledgers stored.
    pub fn load_dir(&self, dir: &Path) -> Result<usize> {
        let mut count = 0;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let ledger = Ledger::from_json_slice(&std::fs::read(&path)?)?;
            tracing::debug!(path = ?path, seq = ledger.seq(), hash = %ledger.hash(), "Stored ledger");
            self.insert(ledger);
            count += 1;
        }
        Ok(count)
    }

    /// Number of stored ledgers.
    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }

    /// Number of `load_by_hash` calls so far.
    pub fn hash_loads(&self) -> u64 {
        self.hash_loads.get()
    }

    /// Number of `load_by_index` calls so far.
    pub fn index_loads(&self) -> u64 {
        self.index_loads.get()
    }
}

impl LedgerLoader for MemoryLedgerStore {
    fn load_by_hash(&self, hash: &Hash256) -> Option<Arc<Ledger>> {
        self.hash_loads.inc();
        self.by_hash
            .get(hash)
            .map(|entry| Arc::new(entry.value().clone()))
    }

    fn load_by_index(&self, seq: u32) -> Option<Arc<Ledger>> {
        self.index_loads.inc();
        let hash = self.by_index.read().get(&seq).copied()?;
        self.by_hash
            .get(&hash)
            .map(|entry| Arc::new(entry.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LedgerBuilder;

    #[test]
    fn test_loads_fresh_instances() {
        let store = MemoryLedgerStore::new();
        let ledger = LedgerBuilder::new(5, Hash256::hash(b"p")).build();
        let hash = ledger.hash();
        store.insert(ledger);

        let a = store.load_by_hash(&hash).unwrap();
        let b = store.load_by_hash(&hash).unwrap();
        assert_eq!(a.hash(), hash);
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(store.hash_loads(), 2);

        assert_eq!(store.load_by_index(5).unwrap().hash(), hash);
        assert!(store.load_by_index(6).is_none());
        assert_eq!(store.index_loads(), 2);
    }

    #[test]
    fn test_insert_by_hash_is_not_indexed() {
        let store = MemoryLedgerStore::new();
        let fork = LedgerBuilder::new(5, Hash256::hash(b"other")).build();
        let hash = fork.hash();
        store.insert_by_hash(fork);
        assert!(store.load_by_index(5).is_none());
        assert!(store.load_by_hash(&hash).is_some());
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = LedgerBuilder::new(9, Hash256::hash(b"p")).close_time(3).build();
        std::fs::write(
            dir.path().join("nine.json"),
            ledger.to_json_string().unwrap(),
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let store = MemoryLedgerStore::new();
        assert_eq!(store.load_dir(dir.path()).unwrap(), 1);
        assert_eq!(store.load_by_index(9).unwrap().hash(), ledger.hash());
    }

    #[test]
    fn test_null_loader() {
        assert!(NullLedgerLoader.load_by_hash(&Hash256::hash(b"x")).is_none());
        assert!(NullLedgerLoader.load_by_index(1).is_none());
    }
}
