//! Time sources for cool-down measurement
//!
//! This module provides two clocks:
//! - `MonotonicClock`: real elapsed time anchored at construction
//! - `ManualClock`: time that only moves when told to, for tests and demos

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Abstract monotonic time source shared by every key of a registry
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Get monotonic time in seconds (relative to the clock's own origin)
    fn monotonic_time(&self) -> f64;
}

/// Clock backed by `Instant`
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    /// Monotonic time anchor (prevents clock skew issues from NTP)
    start_time: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn monotonic_time(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }
}

/// Manually driven clock
///
/// Starts at `0.0` and never moves on its own, so cool-down windows can be
/// crossed deterministically.
///
/// # Example
///
/// ```rust
/// use keyed_breaker::{Clock, ManualClock};
///
/// let clock = ManualClock::new();
/// clock.advance(11.0);
/// assert_eq!(clock.monotonic_time(), 11.0);
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    /// `f64` seconds stored as raw bits
    now: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward by `seconds`
    pub fn advance(&self, seconds: f64) {
        let mut current = self.now.load(Ordering::Acquire);

        loop {
            let next = (f64::from_bits(current) + seconds).to_bits();
            match self.now.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Jump to an absolute time
    pub fn set(&self, seconds: f64) {
        self.now.store(seconds.to_bits(), Ordering::Release);
    }
}

impl Clock for ManualClock {
    fn monotonic_time(&self) -> f64 {
        f64::from_bits(self.now.load(Ordering::Acquire))
    }
}
