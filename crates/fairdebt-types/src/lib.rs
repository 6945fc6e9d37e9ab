// ─────────────────────────────────────────────────────────────────────
// Fairness Debt Governor — Types
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Type definitions, configuration, and error hierarchy for the
//! temporal fairness governor.

pub mod config;
pub mod error;
pub mod event;
pub mod record;

pub use config::{DomainKey, MetricKind, MonitorConfig, SeverityWeight, StreamOverride, StreamThresholds};
pub use error::{FairnessError, FairnessResult};
pub use event::{
    Assessment, BatchOutcome, CorrectionOutcome, GroupStats, InterventionEvent, MonitorWarning,
    StreamOutcome,
};
pub use record::{Batch, BatchRecord, Group, ScoredRecord, StreamKey};
