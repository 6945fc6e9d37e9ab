// ─────────────────────────────────────────────────────────────────────
// Fairness Debt Governor — Temporal Fairness Monitor
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Streaming fairness governance for binary classifiers.
//!
//! Disparate-impact shortfall is accumulated per batch as severity-
//! weighted fairness debt. When debt crosses the governance threshold Γ,
//! near-boundary negative predictions of the disadvantaged group are
//! flipped until the batch meets the fairness threshold, without
//! retraining the model.
//!
//! # Governance Invariants
//!
//! 1. **Debt only grows between resets**: contributions are validated
//!    non-negative and finite before they touch the ledger. A batch whose
//!    DI is undefined contributes nothing.
//!
//! 2. **Reset ⇔ complete correction**: the ledger is reset only when a
//!    correction brings DI to the fairness threshold, and every reset is
//!    paired with exactly one complete audit entry. Partial corrections
//!    keep debt elevated so the next batch retries.
//!
//! 3. **Deterministic flips**: candidates are ordered by
//!    `|boundary_distance|` then batch index; identical input always
//!    flips the same records in the same order.
//!
//! 4. **One writer per stream**: a stream's assess → accumulate →
//!    correct → reset cycle runs under that stream's lock. Streams share
//!    no mutable state.
//!
//! 5. **Monitoring never halts**: malformed records, undefined or
//!    invalid metric scores, infeasible corrections and failed stream
//!    cycles degrade to warnings on the batch outcome.

pub mod audit;
pub mod clock;
pub mod corrector;
pub mod governor;
pub mod ledger;
pub mod metric;
pub mod monitor;
pub mod mttfr;
pub mod report;

pub use audit::{forward, AuditLog, AuditSink, ExternalSink, MemorySink};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use corrector::{Candidate, Correction, CorrectionResult, DirectBiasCorrector};
pub use governor::FairnessGovernor;
pub use ledger::{DebtLedger, DebtState};
pub use metric::{checked_measure, DisparateImpact, ExternalMetric, FairnessMetric};
pub use monitor::{FairnessMonitor, Partition};
pub use mttfr::MttfrTracker;
pub use report::{GovernanceReport, GovernorSnapshot, StreamReport, StreamSnapshot};
