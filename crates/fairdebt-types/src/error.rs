// ─────────────────────────────────────────────────────────────────────
// Fairness Debt Governor — Error Hierarchy
// ─────────────────────────────────────────────────────────────────────

use thiserror::Error;

/// Root error type for all fairness governor failures.
///
/// Only configuration problems, out-of-order batches, and empty batches
/// are returned as `Err` from the per-batch call. The other variants
/// are produced by lower-level operations and recovered by the governor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FairnessError {
    /// Invalid or unobserved configuration (protected attribute,
    /// disadvantaged group, thresholds).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Invalid input to an operation.
    #[error("validation error: {0}")]
    Validation(String),

    /// Advantaged-group positive rate is zero (or a group is empty).
    #[error("disparate impact undefined: {0}")]
    UndefinedDisparateImpact(String),

    /// No flips could restore fairness within the correction cap.
    #[error("correction infeasible: {0}")]
    CorrectionInfeasible(String),

    /// A batch record is missing a required field or carries an
    /// invalid value.
    #[error("malformed record #{index}: {reason}")]
    MalformedRecord { index: usize, reason: String },

    /// Batch timestamp precedes the last processed batch.
    #[error("out-of-order batch: timestamp {got_s:.6}s precedes {last_s:.6}s")]
    OutOfOrder { last_s: f64, got_s: f64 },

    /// Numerical error (NaN/Inf or negative debt contribution).
    #[error("numerical error: {0}")]
    Numerical(String),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type FairnessResult<T> = Result<T, FairnessError>;

impl From<serde_json::Error> for FairnessError {
    fn from(e: serde_json::Error) -> Self {
        FairnessError::Serialization(e.to_string())
    }
}
