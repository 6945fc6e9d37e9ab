// ─────────────────────────────────────────────────────────────────────
// Fairness Debt Governor — MTTFR Tracker
// ─────────────────────────────────────────────────────────────────────
//! Mean Time To Fairness Recovery: running mean of the intervals between
//! successive complete corrections, the first interval measured from
//! session start. Partial corrections do not touch the interval clock.

#[derive(Debug, Clone)]
pub struct MttfrTracker {
    started_at_s: f64,
    last_complete_s: Option<f64>,
    intervals: u64,
    mean_s: f64,
}

impl MttfrTracker {
    pub fn new(started_at_s: f64) -> Self {
        Self {
            started_at_s,
            last_complete_s: None,
            intervals: 0,
            mean_s: 0.0,
        }
    }

    /// Rebuild from complete-correction timestamps in audit order.
    pub fn replay(started_at_s: f64, complete_timestamps: impl IntoIterator<Item = f64>) -> Self {
        let mut tracker = Self::new(started_at_s);
        for t in complete_timestamps {
            tracker.record(t);
        }
        tracker
    }

    /// Fold a complete correction at `at_s` into the mean. Returns the
    /// interval recorded.
    pub fn record(&mut self, at_s: f64) -> f64 {
        let anchor = self.last_complete_s.unwrap_or(self.started_at_s);
        let interval = (at_s - anchor).max(0.0);
        self.intervals += 1;
        self.mean_s += (interval - self.mean_s) / self.intervals as f64;
        self.last_complete_s = Some(at_s);
        interval
    }

    /// Current MTTFR, undefined before the first complete correction.
    pub fn mttfr(&self) -> Option<f64> {
        if self.intervals == 0 {
            None
        } else {
            Some(self.mean_s)
        }
    }

    /// Time since the last complete correction (or session start).
    pub fn current_age(&self, now_s: f64) -> f64 {
        (now_s - self.last_complete_s.unwrap_or(self.started_at_s)).max(0.0)
    }

    /// `current_age / mttfr`: above 1 means recovery is overdue.
    pub fn age_ratio(&self, now_s: f64) -> Option<f64> {
        self.mttfr()
            .filter(|m| *m > 0.0)
            .map(|m| self.current_age(now_s) / m)
    }

    pub fn complete_corrections(&self) -> u64 {
        self.intervals
    }
}
