// ─────────────────────────────────────────────────────────────────────
// Fairness Debt Governor — Debt Ledger
// ─────────────────────────────────────────────────────────────────────
//! Single-writer accumulator of cumulative fairness debt for one stream.
//!
//! Debt is never negative, never decreases between resets, and is
//! exactly zero right after a reset. Mutation requires `&mut self`; the
//! governor serializes access per stream.

use serde::{Deserialize, Serialize};

use fairdebt_types::{FairnessError, FairnessResult};

/// Serializable ledger state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebtState {
    /// Cumulative debt D since the last reset.
    pub debt: f64,
    /// Session time of the last reset, if any.
    pub last_reset_s: Option<f64>,
    /// Per-batch contributions since the last reset, in arrival order.
    pub contributions: Vec<f64>,
    /// Total resets over the session.
    pub resets: u64,
}

/// Fairness debt ledger with threshold Γ.
#[derive(Debug, Clone)]
pub struct DebtLedger {
    state: DebtState,
    governance_threshold: f64,
}

impl DebtLedger {
    pub fn new(governance_threshold: f64) -> Self {
        Self {
            state: DebtState::default(),
            governance_threshold,
        }
    }

    /// Resume from a persisted state.
    pub fn from_state(governance_threshold: f64, state: DebtState) -> FairnessResult<Self> {
        if !state.debt.is_finite() || state.debt < 0.0 {
            return Err(FairnessError::Validation(format!(
                "restored debt must be finite and >= 0, got {}",
                state.debt
            )));
        }
        if state
            .contributions
            .iter()
            .any(|c| !c.is_finite() || *c < 0.0)
        {
            return Err(FairnessError::Validation(
                "restored debt contributions must be finite and >= 0".to_string(),
            ));
        }
        Ok(Self {
            state,
            governance_threshold,
        })
    }

    /// `D ← D + ΔD`. Rejects negative or non-finite contributions
    /// without touching the ledger.
    pub fn accumulate(&mut self, delta: f64) -> FairnessResult<f64> {
        if !delta.is_finite() || delta < 0.0 {
            return Err(FairnessError::Numerical(format!(
                "debt contribution must be finite and >= 0, got {delta}"
            )));
        }
        self.state.debt += delta;
        self.state.contributions.push(delta);
        Ok(self.state.debt)
    }

    /// `D >= Γ`.
    pub fn exceeds_threshold(&self) -> bool {
        self.state.debt >= self.governance_threshold
    }

    /// `D ← 0`, stamping the reset time. Returns the debt cleared.
    pub fn reset(&mut self, at_s: f64) -> f64 {
        let cleared = self.state.debt;
        self.state.debt = 0.0;
        self.state.contributions.clear();
        self.state.last_reset_s = Some(at_s);
        self.state.resets += 1;
        cleared
    }

    pub fn debt(&self) -> f64 {
        self.state.debt
    }

    pub fn governance_threshold(&self) -> f64 {
        self.governance_threshold
    }

    pub fn contributions(&self) -> &[f64] {
        &self.state.contributions
    }

    pub fn last_reset_s(&self) -> Option<f64> {
        self.state.last_reset_s
    }

    pub fn state(&self) -> &DebtState {
        &self.state
    }
}
