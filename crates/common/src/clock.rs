//! Monotonic clock with a virtual-time mode.
//!
//! Both ledger history caches age their entries out after a fixed lifetime.
//! Rather than reading [`Instant::now`] directly, they read a shared
//! [`Clock`], which in [`ClockMode::VirtualTime`] only moves when told to.
//! This lets tests exercise expiry without sleeping.
//!
//! # Example
//!
//! ```rust
//! use ledgerwatch_common::Clock;
//! use std::time::Duration;
//!
//! let clock = Clock::virtual_time();
//! let start = clock.now();
//! clock.advance_by(Duration::from_secs(300));
//! assert_eq!(clock.now() - start, Duration::from_secs(300));
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// How a [`Clock`] advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockMode {
    /// Time only advances through [`Clock::advance_by`].
    VirtualTime,
    /// Time follows the system monotonic clock.
    RealTime,
}

/// A thread-safe monotonic time source.
#[derive(Debug)]
pub struct Clock {
    mode: ClockMode,
    /// Virtual offset from `start_instant`, in nanoseconds.
    virtual_nanos: AtomicU64,
    start_instant: Instant,
}

impl Default for Clock {
    fn default() -> Self {
        Self::real_time()
    }
}

impl Clock {
    /// Creates a clock that follows the system monotonic clock.
    pub fn real_time() -> Self {
        Self::new(ClockMode::RealTime)
    }

    /// Creates a clock that starts frozen and advances only on request.
    pub fn virtual_time() -> Self {
        Self::new(ClockMode::VirtualTime)
    }

    /// Creates a clock in the given mode.
    pub fn new(mode: ClockMode) -> Self {
        Self {
            mode,
            virtual_nanos: AtomicU64::new(0),
            start_instant: Instant::now(),
        }
    }

    /// Returns the mode of this clock.
    pub fn mode(&self) -> ClockMode {
        self.mode
    }

    /// Returns the current time.
    pub fn now(&self) -> Instant {
        match self.mode {
            ClockMode::VirtualTime => {
                let nanos = self.virtual_nanos.load(Ordering::Acquire);
                self.start_instant + Duration::from_nanos(nanos)
            }
            ClockMode::RealTime => Instant::now(),
        }
    }

    /// Advances virtual time. Has no effect on a real-time clock.
    pub fn advance_by(&self, duration: Duration) {
        if self.mode == ClockMode::VirtualTime {
            let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
            self.virtual_nanos.fetch_add(nanos, Ordering::AcqRel);
        }
    }

    /// Time elapsed since `earlier`, saturating at zero.
    pub fn elapsed_since(&self, earlier: Instant) -> Duration {
        self.now().saturating_duration_since(earlier)
    }
}
