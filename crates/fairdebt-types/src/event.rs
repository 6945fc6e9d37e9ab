// ─────────────────────────────────────────────────────────────────────
// Fairness Debt Governor — Assessment, Intervention, and Outcome Types
// ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};

use crate::record::StreamKey;

/// Member and positive-prediction counts for one group in a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupStats {
    pub count: usize,
    pub positives: usize,
}

impl GroupStats {
    /// Positive rate, or `None` for an empty group.
    pub fn positive_rate(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.positives as f64 / self.count as f64)
        }
    }
}

/// Per-batch fairness measurement for one stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub stream: StreamKey,
    pub disadvantaged: GroupStats,
    pub advantaged: GroupStats,
    /// Disparate impact; `None` when undefined for this batch.
    pub di: Option<f64>,
    /// `max(0, fairness_threshold - DI)`; 0 when DI is undefined.
    pub risk: f64,
    /// `H * risk * batch_size`; 0 when DI is undefined.
    pub delta_debt: f64,
    /// Number of valid records in the stream.
    pub batch_size: usize,
    /// Why DI is undefined, when it is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub undefined_reason: Option<String>,
}

impl Assessment {
    pub fn is_defined(&self) -> bool {
        self.di.is_some()
    }
}

/// How a correction attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionOutcome {
    /// DI reached the fairness threshold; the ledger was reset.
    Complete,
    /// Cap reached (or no candidates) before the threshold; debt stays.
    Partial,
}

/// Immutable record of one correction attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionEvent {
    /// Position in the stream's audit log, starting at 0.
    pub sequence: u64,
    pub stream: StreamKey,
    pub timestamp_s: f64,
    pub batch_id: String,
    pub outcome: CorrectionOutcome,
    pub di_before: f64,
    pub di_after: f64,
    pub debt_before: f64,
    pub debt_after: f64,
    pub eligible_candidates: usize,
    pub flip_cap: usize,
    /// Batch indices flipped to positive, in flip order.
    pub flipped_indices: Vec<usize>,
    /// Boundary distance of each flipped record, aligned with
    /// `flipped_indices`; `None` where the scorer supplied no distance.
    pub boundary_distances: Vec<Option<f64>>,
}

impl InterventionEvent {
    pub fn flips(&self) -> usize {
        self.flipped_indices.len()
    }

    pub fn is_complete(&self) -> bool {
        self.outcome == CorrectionOutcome::Complete
    }
}

/// Recoverable conditions reported alongside a batch outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MonitorWarning {
    /// DI undefined; debt accumulation skipped for this batch.
    UndefinedDisparateImpact { stream: StreamKey, reason: String },
    /// Correction could not reach the threshold; recorded as partial.
    CorrectionInfeasible { stream: StreamKey, reason: String },
    /// Record excluded from DI computation.
    RecordRejected { index: usize, reason: String },
    /// The stream's cycle failed before touching its ledger; its records
    /// pass through uncorrected.
    StreamSkipped { stream: StreamKey, reason: String },
}

/// Result of one monitoring cycle on one stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamOutcome {
    pub stream: StreamKey,
    /// DI measured on this batch (after correction, if any flips applied).
    pub di: Option<f64>,
    /// DI for reporting: this batch's, or the last defined one carried
    /// forward when this batch's DI is undefined.
    pub reported_di: Option<f64>,
    pub risk: f64,
    pub delta_debt: f64,
    /// Ledger debt after this cycle.
    pub debt: f64,
    pub governance_threshold: f64,
    /// True when a correction was attempted on this batch (an audit
    /// entry exists).
    pub intervened: bool,
    pub audit_entry: Option<InterventionEvent>,
}

/// Result of one per-batch call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub batch_id: String,
    pub timestamp_s: f64,
    /// Prediction per input record after correction; `None` for
    /// rejected records.
    pub corrected_predictions: Vec<Option<u8>>,
    pub streams: Vec<StreamOutcome>,
    pub warnings: Vec<MonitorWarning>,
}

impl BatchOutcome {
    /// True when any stream attempted a correction.
    pub fn intervened(&self) -> bool {
        self.streams.iter().any(|s| s.intervened)
    }

    pub fn stream(&self, key: &StreamKey) -> Option<&StreamOutcome> {
        self.streams.iter().find(|s| &s.stream == key)
    }

    /// Audit entries produced by this batch, across streams.
    pub fn audit_entries(&self) -> impl Iterator<Item = &InterventionEvent> {
        self.streams.iter().filter_map(|s| s.audit_entry.as_ref())
    }
}
