// ─────────────────────────────────────────────────────────────────────
// Fairness Debt Governor — Governance Report and Snapshot
// ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};

use fairdebt_types::{FairnessResult, InterventionEvent, StreamKey};

use crate::ledger::DebtState;

/// Governance KPIs for one stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamReport {
    pub stream: StreamKey,
    pub debt: f64,
    pub governance_threshold: f64,
    pub correction_strength: f64,
    /// Last defined DI (after correction, if any).
    pub last_di: Option<f64>,
    pub complete_corrections: usize,
    pub partial_corrections: usize,
    pub mttfr_s: Option<f64>,
    /// Seconds since the last complete correction (or session start).
    pub age_s: f64,
    /// `age_s / mttfr_s`; above 1 means recovery is overdue.
    pub age_ratio: Option<f64>,
}

/// Governance KPIs across all streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceReport {
    pub generated_at_s: f64,
    pub streams: Vec<StreamReport>,
}

impl GovernanceReport {
    pub fn total_complete(&self) -> usize {
        self.streams.iter().map(|s| s.complete_corrections).sum()
    }

    pub fn total_partial(&self) -> usize {
        self.streams.iter().map(|s| s.partial_corrections).sum()
    }

    pub fn to_json(&self) -> FairnessResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Persisted state of one stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSnapshot {
    pub stream: StreamKey,
    pub debt: DebtState,
    pub audit: Vec<InterventionEvent>,
    pub last_di: Option<f64>,
    pub last_timestamp_s: Option<f64>,
}

/// Persisted governor state, for resuming a session after restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernorSnapshot {
    pub started_at_s: f64,
    pub taken_at_s: f64,
    pub protected_observed: bool,
    pub disadvantaged_observed: bool,
    pub streams: Vec<StreamSnapshot>,
}

impl GovernorSnapshot {
    pub fn to_json(&self) -> FairnessResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> FairnessResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
