// ─────────────────────────────────────────────────────────────────────
// Fairness Debt Governor — Session Clock
// ─────────────────────────────────────────────────────────────────────
//! Time source for batch stamps, debt resets, and MTTFR.
//!
//! All timestamps are seconds since session start as `f64`, the same
//! frame used in audit entries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Source of session-relative timestamps.
pub trait Clock: Send + Sync {
    /// Seconds since session start. Never decreases.
    fn now_s(&self) -> f64;
}

/// Wall-monotonic clock backed by `Instant`.
pub struct MonotonicClock {
    origin: Instant,
    offset_s: f64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::starting_at(0.0)
    }

    /// Clock whose first reading is `offset_s`, for sessions resumed
    /// from a snapshot.
    pub fn starting_at(offset_s: f64) -> Self {
        Self {
            origin: Instant::now(),
            offset_s: offset_s.max(0.0),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_s(&self) -> f64 {
        self.offset_s + self.origin.elapsed().as_secs_f64()
    }
}

/// Manually driven clock for replaying recorded streams.
pub struct ManualClock {
    bits: AtomicU64,
}

impl ManualClock {
    pub fn new(start_s: f64) -> Self {
        Self {
            bits: AtomicU64::new(start_s.to_bits()),
        }
    }

    pub fn set(&self, now_s: f64) {
        self.bits.store(now_s.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, dt_s: f64) {
        let now = self.now_s();
        self.set(now + dt_s);
    }
}

impl Clock for ManualClock {
    fn now_s(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}
