//! Bounded cache of immutable ledgers keyed by hash.
//!
//! The cache holds at most one `Arc<Ledger>` per hash and bounds itself two
//! ways:
//!
//! - **Size**: when full, one entry is evicted using the
//!   "least-recent-out-of-2-random-choices" strategy, which approximates LRU
//!   with O(1) bookkeeping.
//! - **Age**: an entry untouched for longer than `max_age` is dropped by
//!   [`LedgerCache::sweep`]. Until then lookups still return it, so the
//!   cached instance stays the only one handed out for its hash.
//!
//! [`LedgerCache::retrieve_or_insert`] is atomic with respect to concurrent
//! inserts of the same hash: if two callers race with distinct instances, the
//! first one in wins and both get the surviving instance back.
//!
//! # Thread Safety
//!
//! All state sits behind one `parking_lot::Mutex`; every operation is a
//! single critical section.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ledgerwatch_common::{Clock, Hash256};
use parking_lot::Mutex;
use serde::Serialize;

use crate::Ledger;

/// A cached ledger with access metadata.
#[derive(Debug)]
struct CacheEntry {
    ledger: Arc<Ledger>,
    /// Last insert or fetch, for age-based expiry.
    touched_at: Instant,
    /// Global access counter value at last touch, for eviction sampling.
    access_count: u64,
    /// Index into `CacheInner::keys` for O(1) swap-remove.
    vec_index: usize,
}

/// State protected by the cache mutex.
#[derive(Debug)]
struct CacheInner {
    entries: HashMap<Hash256, CacheEntry>,
    /// Keys stored redundantly for O(1) random access during eviction.
    keys: Vec<Hash256>,
    access_counter: u64,
    /// xorshift64 state for eviction sampling.
    rng_state: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl CacheInner {
    /// Returns a pseudo-random index in [0, len).
    fn rand_index(&mut self, len: usize) -> usize {
        let mut x = self.rng_state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng_state = x;
        (x as usize) % len
    }

    fn next_access(&mut self) -> u64 {
        self.access_counter += 1;
        self.access_counter
    }

    /// Remove an entry by key, keeping `keys` in sync.
    fn remove(&mut self, key: &Hash256) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.swap_remove_key(entry.vec_index);
        Some(entry)
    }

    /// Swap-removes the key at `idx`, updating the moved entry's index.
    fn swap_remove_key(&mut self, idx: usize) {
        let last_idx = self.keys.len() - 1;
        if idx != last_idx {
            self.keys.swap(idx, last_idx);
            let swapped_key = self.keys[idx];
            if let Some(entry) = self.entries.get_mut(&swapped_key) {
                entry.vec_index = idx;
            }
        }
        self.keys.pop();
    }

    fn push(&mut self, key: Hash256, ledger: Arc<Ledger>, now: Instant) {
        let access_count = self.next_access();
        let vec_index = self.keys.len();
        self.keys.push(key);
        self.entries.insert(
            key,
            CacheEntry {
                ledger,
                touched_at: now,
                access_count,
                vec_index,
            },
        );
    }

    /// Rebuild `keys` after a bulk removal from `entries`.
    fn reindex(&mut self) {
        self.keys.clear();
        for (key, entry) in self.entries.iter_mut() {
            entry.vec_index = self.keys.len();
            self.keys.push(*key);
        }
    }
}

/// Size- and age-bounded cache of ledgers keyed by hash.
pub struct LedgerCache {
    name: &'static str,
    inner: Mutex<CacheInner>,
    max_entries: usize,
    max_age: Duration,
    clock: Arc<Clock>,
}

impl LedgerCache {
    /// Creates a cache holding up to `max_entries` ledgers for `max_age` each.
    pub fn new(
        name: &'static str,
        max_entries: usize,
        max_age: Duration,
        clock: Arc<Clock>,
    ) -> Self {
        Self {
            name,
            inner: Mutex::new(CacheInner {
                entries: HashMap::with_capacity(max_entries.min(1024)),
                keys: Vec::with_capacity(max_entries.min(1024)),
                access_counter: 0,
                rng_state: 0x5EED_CAFE_BABE_D00D,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            max_entries: max_entries.max(1),
            max_age,
            clock,
        }
    }

    /// Looks up a ledger, refreshing its age on a hit.
    ///
    /// Any stored entry is returned, however old. Expiry happens only in
    /// [`LedgerCache::sweep`] and capacity eviction, so a cached instance
    /// stays canonical for as long as it is cached.
    pub fn fetch(&self, hash: &Hash256) -> Option<Arc<Ledger>> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let access_count = inner.next_access();

        let found = inner.entries.get_mut(hash).map(|entry| {
            entry.touched_at = now;
            entry.access_count = access_count;
            Arc::clone(&entry.ledger)
        });
        match found {
            Some(_) => inner.hits += 1,
            None => inner.misses += 1,
        }
        found
    }

    /// Inserts a ledger, replacing any instance cached under the same hash.
    ///
    /// Returns `true` if an entry for that hash was already present.
    pub fn insert_or_assign(&self, ledger: Arc<Ledger>) -> bool {
        let hash = ledger.hash();
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let access_count = inner.next_access();

        if let Some(entry) = inner.entries.get_mut(&hash) {
            entry.ledger = ledger;
            entry.touched_at = now;
            entry.access_count = access_count;
            return true;
        }

        self.make_room(&mut inner);
        inner.push(hash, ledger, now);
        false
    }

    /// Returns the cached instance for the ledger's hash, inserting the given
    /// instance first if none is cached.
    ///
    /// Whichever instance is returned is the canonical one for that hash.
    pub fn retrieve_or_insert(&self, ledger: Arc<Ledger>) -> Arc<Ledger> {
        let hash = ledger.hash();
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let access_count = inner.next_access();

        if let Some(entry) = inner.entries.get_mut(&hash) {
            // Expired entries are revived, not replaced.
            entry.touched_at = now;
            entry.access_count = access_count;
            return Arc::clone(&entry.ledger);
        }

        self.make_room(&mut inner);
        inner.push(hash, Arc::clone(&ledger), now);
        ledger
    }

    /// Removes every ledger for which `predicate` returns `true`.
    ///
    /// Returns the number of entries removed.
    pub fn erase_if<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&Ledger) -> bool,
    {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| !predicate(entry.ledger.as_ref()));
        let removed = before - inner.entries.len();
        if removed > 0 {
            inner.reindex();
        }
        removed
    }

    /// Drops every entry untouched for longer than `max_age`.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let max_age = self.max_age;
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner
            .entries
            .retain(|_, entry| now.saturating_duration_since(entry.touched_at) <= max_age);
        let removed = before - inner.entries.len();
        if removed > 0 {
            inner.reindex();
            inner.evictions += removed as u64;
        }
        removed
    }

    /// Evicts one entry if the cache is at capacity.
    fn make_room(&self, inner: &mut CacheInner) {
        if inner.keys.len() < self.max_entries {
            return;
        }
        let sz = inner.keys.len();
        if sz == 0 {
            return;
        }

        let idx1 = inner.rand_index(sz);
        let idx2 = inner.rand_index(sz);
        let access = |inner: &CacheInner, idx: usize| {
            inner
                .entries
                .get(&inner.keys[idx])
                .map_or(0, |entry| entry.access_count)
        };
        let victim_idx = if access(inner, idx1) <= access(inner, idx2) {
            idx1
        } else {
            idx2
        };

        let victim_key = inner.keys[victim_idx];
        inner.remove(&victim_key);
        inner.evictions += 1;
    }

    /// Returns `true` if a ledger with this hash is cached, however old.
    pub fn contains(&self, hash: &Hash256) -> bool {
        self.inner.lock().entries.contains_key(hash)
    }

    /// Returns the current number of cached ledgers.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Checks if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Point-in-time statistics.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            name: self.name.to_string(),
            entry_count: inner.entries.len(),
            max_entries: self.max_entries,
            max_age_secs: self.max_age.as_secs(),
            hits: inner.hits,
            misses: inner.misses,
            hit_rate: if inner.hits + inner.misses > 0 {
                inner.hits as f64 / (inner.hits + inner.misses) as f64
            } else {
                0.0
            },
            evictions: inner.evictions,
        }
    }
}

impl std::fmt::Debug for LedgerCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("LedgerCache")
            .field("name", &stats.name)
            .field("entry_count", &stats.entry_count)
            .field("max_entries", &stats.max_entries)
            .field("hit_rate", &format!("{:.2}%", stats.hit_rate * 100.0))
            .finish()
    }
}

/// Statistics about cache occupancy and performance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub name: String,
    pub entry_count: usize,
    pub max_entries: usize,
    pub max_age_secs: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub evictions: u64,
}
