//! Built/validated correlation per ledger sequence.
//!
//! A node learns about a sequence twice: once when it builds a ledger from
//! its own consensus result, and once when the network validates a ledger.
//! The two events arrive independently, in either order, often from
//! different threads. [`ConsensusTracker`] pairs them up in a short-lived,
//! bounded map keyed by sequence and calls back into the mismatch analysis
//! when the pair disagrees.
//!
//! # State Machine
//!
//! ```text
//! Empty ──record_*──▶ Pending(side) ──record_other──▶ Matched | LateMatch | Mismatch
//!                                                        │
//!                                   any later record ──▶ AlreadyResolved
//! ```
//!
//! Each entry sits behind its own lock, held across the whole
//! read-compare-store sequence, so a diverging pair is diagnosed exactly
//! once even when both sides race.
//!
//! # Bounds
//!
//! Entries expire `max_age` after their last touch. When the map is full,
//! the lowest sequence is dropped first.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ledgerwatch_common::{Clock, Hash256};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, trace};

use crate::mismatch::Diagnosis;

/// What the node knows about one sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsensusEntry {
    /// Hash of the ledger this node built.
    pub built: Option<Hash256>,
    /// Consensus transaction set the built ledger was made from.
    pub built_consensus_hash: Option<Hash256>,
    /// Opaque consensus round snapshot recorded with the built ledger.
    pub consensus: Option<serde_json::Value>,
    /// Hash of the ledger the network validated.
    pub validated: Option<Hash256>,
    /// Consensus transaction set reported with the validation, if known.
    pub validated_consensus_hash: Option<Hash256>,
}

impl ConsensusEntry {
    /// Both sides are known.
    pub fn is_resolved(&self) -> bool {
        self.built.is_some() && self.validated.is_some()
    }
}

/// Everything the mismatch analysis needs about a diverging pair.
#[derive(Debug, Clone, PartialEq)]
pub struct MismatchInput {
    pub seq: u32,
    pub built: Hash256,
    pub valid: Hash256,
    pub built_consensus_hash: Option<Hash256>,
    pub validated_consensus_hash: Option<Hash256>,
    pub consensus: serde_json::Value,
}

/// Result of recording one side of a sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TrackOutcome {
    /// The other side is not known yet.
    Pending,
    /// The validated ledger matches what was built earlier.
    Matched,
    /// The built ledger matches what was validated earlier.
    LateMatch,
    /// The two sides differ; carries the analysis result.
    Mismatch(Diagnosis),
    /// Both sides were already known; nothing is compared again.
    AlreadyResolved,
}

impl TrackOutcome {
    /// Returns `true` if this call detected a divergence.
    pub fn is_mismatch(&self) -> bool {
        matches!(self, TrackOutcome::Mismatch(_))
    }
}

/// Point-in-time tracker statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackerStats {
    pub entry_count: usize,
    pub max_entries: usize,
    pub max_age_secs: u64,
    /// Lookups that found a live entry.
    pub hits: u64,
    /// Entries created.
    pub created: u64,
    /// Entries dropped for age or capacity.
    pub evictions: u64,
}

#[derive(Debug)]
struct Slot {
    entry: Arc<Mutex<ConsensusEntry>>,
    touched_at: Instant,
}

#[derive(Debug, Default)]
struct TrackerInner {
    slots: BTreeMap<u32, Slot>,
    hits: u64,
    created: u64,
    evictions: u64,
}

/// Bounded, age-limited map from sequence to [`ConsensusEntry`].
pub struct ConsensusTracker {
    inner: Mutex<TrackerInner>,
    max_entries: usize,
    max_age: Duration,
    clock: Arc<Clock>,
}

impl ConsensusTracker {
    /// Create a tracker holding up to `max_entries` sequences for `max_age`.
    pub fn new(max_entries: usize, max_age: Duration, clock: Arc<Clock>) -> Self {
        Self {
            inner: Mutex::new(TrackerInner::default()),
            max_entries: max_entries.max(1),
            max_age,
            clock,
        }
    }

    /// Get the live entry for `seq`, creating it if absent or expired.
    ///
    /// Entries whose lock is held are never removed here or in
    /// [`ConsensusTracker::sweep`]. The check runs under the map lock.
    fn entry_for(&self, seq: u32) -> Arc<Mutex<ConsensusEntry>> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        let mut expired = false;
        if let Some(slot) = inner.slots.get_mut(&seq) {
            let live = now.saturating_duration_since(slot.touched_at) <= self.max_age;
            if live || slot.entry.is_locked() {
                slot.touched_at = now;
                let entry = Arc::clone(&slot.entry);
                inner.hits += 1;
                return entry;
            }
            expired = true;
        }

        if expired {
            inner.slots.remove(&seq);
            inner.evictions += 1;
            trace!(seq, "Consensus entry expired");
        }

        // Evict the lowest idle sequences if the map is full
        while inner.slots.len() >= self.max_entries {
            let victim = inner
                .slots
                .iter()
                .find(|(_, slot)| slot.entry.try_lock().is_some())
                .map(|(seq, _)| *seq);
            match victim {
                Some(oldest) => {
                    inner.slots.remove(&oldest);
                    inner.evictions += 1;
                    trace!(seq = oldest, "Consensus entry evicted");
                }
                // Every entry is mid-update; go over capacity briefly.
                None => break,
            }
        }

        let entry = Arc::new(Mutex::new(ConsensusEntry::default()));
        inner.slots.insert(
            seq,
            Slot {
                entry: Arc::clone(&entry),
                touched_at: now,
            },
        );
        inner.created += 1;
        entry
    }

    /// Run `f` on the entry for `seq` with the entry locked.
    ///
    /// After locking, the entry is checked to still be the one mapped for
    /// `seq`; if it was evicted in between, a fresh lookup is made.
    fn with_entry<R>(&self, seq: u32, f: impl FnOnce(&mut ConsensusEntry) -> R) -> R {
        loop {
            let entry = self.entry_for(seq);
            let mut guard = entry.lock();
            let current = self
                .inner
                .lock()
                .slots
                .get(&seq)
                .is_some_and(|slot| Arc::ptr_eq(&slot.entry, &entry));
            if current {
                return f(&mut *guard);
            }
            trace!(seq, "Consensus entry evicted before use");
        }
    }

    /// Record the ledger this node built for `seq`.
    ///
    /// If the validated side is already known and differs, `on_mismatch` is
    /// called (with the entry locked) before the built side is stored.
    pub fn record_built<F>(
        &self,
        seq: u32,
        hash: Hash256,
        consensus_hash: Hash256,
        consensus: serde_json::Value,
        on_mismatch: F,
    ) -> TrackOutcome
    where
        F: FnOnce(&MismatchInput) -> Diagnosis,
    {
        self.with_entry(seq, |entry| {
            let outcome = match (entry.built, entry.validated) {
                (None, Some(validated)) if validated == hash => {
                    debug!(seq, "MATCH: late");
                    TrackOutcome::LateMatch
                }
                (None, Some(validated)) => {
                    error!(seq, validated = %validated, then = %hash, "MISMATCH");
                    let input = MismatchInput {
                        seq,
                        built: hash,
                        valid: validated,
                        built_consensus_hash: Some(consensus_hash),
                        validated_consensus_hash: entry.validated_consensus_hash,
                        consensus: consensus.clone(),
                    };
                    TrackOutcome::Mismatch(on_mismatch(&input))
                }
                (Some(_), Some(_)) => TrackOutcome::AlreadyResolved,
                (_, None) => TrackOutcome::Pending,
            };

            entry.built = Some(hash);
            entry.built_consensus_hash = Some(consensus_hash);
            entry.consensus = Some(consensus);
            outcome
        })
    }

    /// Record the ledger the network validated for `seq`.
    ///
    /// Symmetric to [`ConsensusTracker::record_built`].
    pub fn record_validated<F>(
        &self,
        seq: u32,
        hash: Hash256,
        consensus_hash: Option<Hash256>,
        on_mismatch: F,
    ) -> TrackOutcome
    where
        F: FnOnce(&MismatchInput) -> Diagnosis,
    {
        self.with_entry(seq, |entry| {
            let outcome = match (entry.built, entry.validated) {
                (Some(built), None) if built == hash => {
                    debug!(seq, "MATCH");
                    TrackOutcome::Matched
                }
                (Some(built), None) => {
                    error!(seq, built = %built, validated = %hash, "Mismatch on validated ledger");
                    let input = MismatchInput {
                        seq,
                        built,
                        valid: hash,
                        built_consensus_hash: entry.built_consensus_hash,
                        validated_consensus_hash: consensus_hash,
                        consensus: entry.consensus.clone().unwrap_or_default(),
                    };
                    TrackOutcome::Mismatch(on_mismatch(&input))
                }
                (Some(_), Some(_)) => TrackOutcome::AlreadyResolved,
                (None, _) => TrackOutcome::Pending,
            };

            entry.validated = Some(hash);
            entry.validated_consensus_hash = consensus_hash;
            outcome
        })
    }

    /// Copy of the entry for `seq`, if tracked and not expired.
    ///
    /// Waits for any update in progress on `seq`, but not while holding the
    /// map lock, so other sequences are unaffected.
    pub fn entry(&self, seq: u32) -> Option<ConsensusEntry> {
        let now = self.clock.now();
        let entry = {
            let inner = self.inner.lock();
            let slot = inner.slots.get(&seq)?;
            if now.saturating_duration_since(slot.touched_at) > self.max_age {
                return None;
            }
            Arc::clone(&slot.entry)
        };
        let snapshot = entry.lock().clone();
        Some(snapshot)
    }

    /// Drop every entry untouched for longer than `max_age`.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let max_age = self.max_age;
        let mut inner = self.inner.lock();
        let before = inner.slots.len();
        inner.slots.retain(|_, slot| {
            now.saturating_duration_since(slot.touched_at) <= max_age || slot.entry.is_locked()
        });
        let removed = before - inner.slots.len();
        inner.evictions += removed as u64;
        removed
    }

    /// Number of tracked sequences.
    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    /// Returns `true` if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().slots.is_empty()
    }

    /// Point-in-time statistics.
    pub fn stats(&self) -> TrackerStats {
        let inner = self.inner.lock();
        TrackerStats {
            entry_count: inner.slots.len(),
            max_entries: self.max_entries,
            max_age_secs: self.max_age.as_secs(),
            hits: inner.hits,
            created: inner.created,
            evictions: inner.evictions,
        }
    }
}

impl std::fmt::Debug for ConsensusTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsensusTracker")
            .field("entry_count", &self.len())
            .field("max_entries", &self.max_entries)
            .field("max_age", &self.max_age)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tracker(max_entries: usize, clock: &Arc<Clock>) -> ConsensusTracker {
        ConsensusTracker::new(max_entries, Duration::from_secs(300), Arc::clone(clock))
    }

    fn h(n: u8) -> Hash256 {
        Hash256([n; 32])
    }

    fn unanalyzable(_: &MismatchInput) -> Diagnosis {
        Diagnosis::Unanalyzable {
            built_found: false,
            valid_found: false,
        }
    }

    fn never(_: &MismatchInput) -> Diagnosis {
        panic!("unexpected mismatch analysis");
    }

    #[test]
    fn test_built_then_validated_match() {
        let clock = Arc::new(Clock::virtual_time());
        let t = tracker(8, &clock);
        let out = t.record_built(5, h(1), h(9), serde_json::Value::Null, never);
        assert_eq!(out, TrackOutcome::Pending);
        let out = t.record_validated(5, h(1), None, never);
        assert_eq!(out, TrackOutcome::Matched);
        assert!(t.entry(5).unwrap().is_resolved());
    }

    #[test]
    fn test_validated_then_built_late_match() {
        let clock = Arc::new(Clock::virtual_time());
        let t = tracker(8, &clock);
        assert_eq!(
            t.record_validated(5, h(1), Some(h(9)), never),
            TrackOutcome::Pending
        );
        assert_eq!(
            t.record_built(5, h(1), h(9), serde_json::Value::Null, never),
            TrackOutcome::LateMatch
        );
    }

    #[test]
    fn test_mismatch_input_built_first() {
        let clock = Arc::new(Clock::virtual_time());
        let t = tracker(8, &clock);
        let consensus = serde_json::json!({"proposers": 4});
        t.record_built(7, h(1), h(10), consensus.clone(), never);

        let mut seen = None;
        let out = t.record_validated(7, h(2), Some(h(11)), |input| {
            seen = Some(input.clone());
            unanalyzable(input)
        });
        assert!(out.is_mismatch());
        assert_eq!(
            seen.unwrap(),
            MismatchInput {
                seq: 7,
                built: h(1),
                valid: h(2),
                built_consensus_hash: Some(h(10)),
                validated_consensus_hash: Some(h(11)),
                consensus,
            }
        );
    }

    #[test]
    fn test_mismatch_input_validated_first() {
        let clock = Arc::new(Clock::virtual_time());
        let t = tracker(8, &clock);
        t.record_validated(7, h(2), None, never);

        let mut seen = None;
        t.record_built(7, h(1), h(10), serde_json::Value::Null, |input| {
            seen = Some(input.clone());
            unanalyzable(input)
        });
        let seen = seen.unwrap();
        assert_eq!(seen.built, h(1));
        assert_eq!(seen.valid, h(2));
        assert_eq!(seen.built_consensus_hash, Some(h(10)));
        assert_eq!(seen.validated_consensus_hash, None);
    }

    #[test]
    fn test_resolved_entry_is_not_rediagnosed() {
        let clock = Arc::new(Clock::virtual_time());
        let t = tracker(8, &clock);
        t.record_built(3, h(1), h(9), serde_json::Value::Null, never);
        assert!(t.record_validated(3, h(2), None, unanalyzable).is_mismatch());

        assert_eq!(
            t.record_built(3, h(2), h(9), serde_json::Value::Null, never),
            TrackOutcome::AlreadyResolved
        );
        assert_eq!(
            t.record_validated(3, h(3), None, never),
            TrackOutcome::AlreadyResolved
        );
        assert_eq!(t.entry(3).unwrap().validated, Some(h(3)));
    }

    #[test]
    fn test_capacity_evicts_lowest_sequence() {
        let clock = Arc::new(Clock::virtual_time());
        let t = tracker(3, &clock);
        for seq in [10, 11, 12, 13] {
            t.record_validated(seq, h(seq as u8), None, never);
        }
        assert_eq!(t.len(), 3);
        assert!(t.entry(10).is_none());
        assert!(t.entry(13).is_some());
        assert_eq!(t.stats().evictions, 1);
    }

    #[test]
    fn test_expired_entry_starts_over() {
        let clock = Arc::new(Clock::virtual_time());
        let t = tracker(8, &clock);
        t.record_built(4, h(1), h(9), serde_json::Value::Null, never);
        clock.advance_by(Duration::from_secs(301));
        assert!(t.entry(4).is_none());

        // The stale built side is gone, so nothing is compared.
        assert_eq!(
            t.record_validated(4, h(2), None, never),
            TrackOutcome::Pending
        );
        assert_eq!(t.stats().created, 2);
    }

    #[test]
    fn test_sweep() {
        let clock = Arc::new(Clock::virtual_time());
        let t = tracker(8, &clock);
        t.record_built(1, h(1), h(9), serde_json::Value::Null, never);
        clock.advance_by(Duration::from_secs(200));
        t.record_built(2, h(2), h(9), serde_json::Value::Null, never);
        clock.advance_by(Duration::from_secs(200));
        assert_eq!(t.sweep(), 1);
        assert!(t.entry(2).is_some());
    }

    #[test]
    fn test_concurrent_sides_diagnose_exactly_once() {
        for round in 0..50u32 {
            let clock = Arc::new(Clock::virtual_time());
            let t = Arc::new(tracker(8, &clock));
            let calls = Arc::new(AtomicUsize::new(0));

            let built = {
                let t = Arc::clone(&t);
                let calls = Arc::clone(&calls);
                std::thread::spawn(move || {
                    t.record_built(round, h(1), h(9), serde_json::Value::Null, |input| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        unanalyzable(input)
                    })
                })
            };
            let validated = {
                let t = Arc::clone(&t);
                let calls = Arc::clone(&calls);
                std::thread::spawn(move || {
                    t.record_validated(round, h(2), None, |input| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        unanalyzable(input)
                    })
                })
            };
            built.join().unwrap();
            validated.join().unwrap();
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }

    /// Starts a mismatch analysis on `seq` that stays inside `on_mismatch`
    /// until `release` is sent on. Returns once the analysis is running.
    fn hold_analysis(
        t: &Arc<ConsensusTracker>,
        seq: u32,
    ) -> (
        std::thread::JoinHandle<TrackOutcome>,
        std::sync::mpsc::Sender<()>,
    ) {
        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        t.record_built(seq, h(1), h(9), serde_json::Value::Null, never);
        let handle = {
            let t = Arc::clone(t);
            std::thread::spawn(move || {
                t.record_validated(seq, h(2), None, move |input| {
                    started_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    unanalyzable(input)
                })
            })
        };
        started_rx.recv().unwrap();
        (handle, release_tx)
    }

    #[test]
    fn test_inspecting_busy_sequence_does_not_stall_others() {
        let clock = Arc::new(Clock::virtual_time());
        let t = Arc::new(tracker(8, &clock));
        let (analysis, release) = hold_analysis(&t, 10);

        let inspector = {
            let t = Arc::clone(&t);
            std::thread::spawn(move || t.entry(10))
        };
        std::thread::sleep(Duration::from_millis(50));

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let unrelated = {
            let t = Arc::clone(&t);
            std::thread::spawn(move || {
                let out = t.record_validated(99, h(7), None, never);
                done_tx.send(()).unwrap();
                out
            })
        };
        let finished = done_rx.recv_timeout(Duration::from_secs(5)).is_ok();

        release.send(()).unwrap();
        assert!(analysis.join().unwrap().is_mismatch());
        assert_eq!(unrelated.join().unwrap(), TrackOutcome::Pending);
        assert_eq!(inspector.join().unwrap().unwrap().validated, Some(h(2)));
        assert!(finished, "record on seq 99 waited for seq 10's analysis");
    }

    #[test]
    fn test_capacity_skips_entry_under_analysis() {
        let clock = Arc::new(Clock::virtual_time());
        let t = Arc::new(tracker(1, &clock));
        let (analysis, release) = hold_analysis(&t, 1);

        // Seq 1 is busy, so the map grows past capacity instead.
        t.record_validated(2, h(5), None, never);
        assert_eq!(t.len(), 2);

        release.send(()).unwrap();
        assert!(analysis.join().unwrap().is_mismatch());
        let entry = t.entry(1).unwrap();
        assert_eq!(entry.built, Some(h(1)));
        assert_eq!(entry.validated, Some(h(2)));

        // Once idle, seq 1 is the first to go.
        t.record_validated(3, h(6), None, never);
        assert!(t.entry(1).is_none());
        assert!(t.entry(3).is_some());
    }

    #[test]
    fn test_sweep_skips_entry_under_analysis() {
        let clock = Arc::new(Clock::virtual_time());
        let t = Arc::new(tracker(8, &clock));
        let (analysis, release) = hold_analysis(&t, 4);

        clock.advance_by(Duration::from_secs(301));
        assert_eq!(t.sweep(), 0);

        release.send(()).unwrap();
        assert!(analysis.join().unwrap().is_mismatch());
        assert_eq!(t.sweep(), 1);
    }
}
