//! Minimal metrics sink.
//!
//! The history reports through plain counters: mismatch analyses run and
//! loader round-trips taken. They only ever go up.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic event counter, shareable between threads.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one event.
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Events recorded so far.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}
