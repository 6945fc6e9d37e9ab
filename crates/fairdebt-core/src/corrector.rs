// ─────────────────────────────────────────────────────────────────────
// Fairness Debt Governor — Direct Bias Corrector
// ─────────────────────────────────────────────────────────────────────
//! Restores disparate impact by flipping near-boundary negative
//! predictions of the disadvantaged group to positive.
//!
//! Candidates are ranked by `|boundary_distance|` ascending, ties broken
//! by batch index, records without a distance last. They are flipped
//! greedily, re-measuring with the stream's metric after each flip,
//! until the score meets the fairness threshold or `⌊α * eligible⌋`
//! flips have been made.

use std::cmp::Ordering;

use fairdebt_types::{CorrectionOutcome, FairnessResult, Group, ScoredRecord};

use crate::metric::{checked_measure, FairnessMetric};
use crate::monitor::meets_threshold;

/// Guards `α * n` products such as `0.29 * 100` against landing just
/// below an integer.
const CAP_EPSILON: f64 = 1e-9;

/// A disadvantaged-group negative prediction eligible for flipping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// Index in the original batch.
    pub index: usize,
    /// `None` when the scorer supplied no distance; such candidates
    /// rank after every measured one.
    pub boundary_distance: Option<f64>,
}

/// Deterministic flip order: closest to the boundary first, unmeasured
/// candidates last, then by original index.
pub fn flip_order(a: &Candidate, b: &Candidate) -> Ordering {
    let by_distance = match (a.boundary_distance, b.boundary_distance) {
        (Some(x), Some(y)) => x.abs().total_cmp(&y.abs()),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_distance.then_with(|| a.index.cmp(&b.index))
}

/// Flips applied by one correction attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionResult {
    pub outcome: CorrectionOutcome,
    pub di_before: f64,
    pub di_after: f64,
    pub eligible: usize,
    pub cap: usize,
    /// Flipped candidates, in flip order.
    pub flips: Vec<Candidate>,
}

impl CorrectionResult {
    /// Zero-flip partial attempt, for when the metric could not score
    /// the batch.
    pub fn unmeasured(di: f64, eligible: usize, cap: usize) -> Self {
        Self {
            outcome: CorrectionOutcome::Partial,
            di_before: di,
            di_after: di,
            eligible,
            cap,
            flips: Vec::new(),
        }
    }

    pub fn flipped_indices(&self) -> Vec<usize> {
        self.flips.iter().map(|c| c.index).collect()
    }

    pub fn boundary_distances(&self) -> Vec<Option<f64>> {
        self.flips.iter().map(|c| c.boundary_distance).collect()
    }
}

/// What the corrector decided for a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Correction {
    /// The score already meets the threshold: zero flips, nothing recorded.
    AlreadyFair { di: f64 },
    Applied(CorrectionResult),
}

/// Direct bias correction with fairness threshold and strength α.
#[derive(Debug, Clone, Copy)]
pub struct DirectBiasCorrector {
    fairness_threshold: f64,
    correction_strength: f64,
}

impl DirectBiasCorrector {
    pub fn new(fairness_threshold: f64, correction_strength: f64) -> Self {
        Self {
            fairness_threshold,
            correction_strength,
        }
    }

    /// `⌊α * eligible⌋`, where `eligible` counts every negative
    /// disadvantaged record, measured distance or not.
    pub fn flip_cap(&self, eligible: usize) -> usize {
        let raw = (self.correction_strength * eligible as f64 + CAP_EPSILON).floor();
        (raw.max(0.0) as usize).min(eligible)
    }

    /// Eligible candidates in flip order.
    pub fn rank_candidates(records: &[ScoredRecord]) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = records
            .iter()
            .filter(|r| r.group == Group::Disadvantaged && !r.is_positive())
            .map(|r| Candidate {
                index: r.index,
                boundary_distance: r.boundary_distance,
            })
            .collect();
        candidates.sort_by(flip_order);
        candidates
    }

    /// Select flips for one stream's batch records, scoring with `metric`.
    ///
    /// Returns `Err(UndefinedDisparateImpact)` when the metric cannot
    /// score the uncorrected batch. A flip whose re-measurement fails is
    /// undone and ends the attempt as partial.
    pub fn correct(
        &self,
        metric: &dyn FairnessMetric,
        records: &[ScoredRecord],
    ) -> FairnessResult<Correction> {
        let (mut disadvantaged, advantaged): (Vec<ScoredRecord>, Vec<ScoredRecord>) = records
            .iter()
            .copied()
            .partition(|r| r.group == Group::Disadvantaged);

        let di_before = checked_measure(metric, &disadvantaged, &advantaged)?;
        if meets_threshold(di_before, self.fairness_threshold) {
            return Ok(Correction::AlreadyFair { di: di_before });
        }

        // Positions into `disadvantaged`, in flip order.
        let mut ranked: Vec<(usize, Candidate)> = disadvantaged
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.is_positive())
            .map(|(pos, r)| {
                (
                    pos,
                    Candidate {
                        index: r.index,
                        boundary_distance: r.boundary_distance,
                    },
                )
            })
            .collect();
        ranked.sort_by(|a, b| flip_order(&a.1, &b.1));
        let eligible = ranked.len();
        let cap = self.flip_cap(eligible);

        let mut di = di_before;
        let mut flips = Vec::with_capacity(cap);
        for (pos, candidate) in ranked.into_iter().take(cap) {
            disadvantaged[pos].prediction = 1;
            match checked_measure(metric, &disadvantaged, &advantaged) {
                Ok(score) => {
                    di = score;
                    flips.push(candidate);
                    if meets_threshold(di, self.fairness_threshold) {
                        break;
                    }
                }
                Err(_) => {
                    disadvantaged[pos].prediction = 0;
                    break;
                }
            }
        }

        let outcome = if meets_threshold(di, self.fairness_threshold) {
            CorrectionOutcome::Complete
        } else {
            CorrectionOutcome::Partial
        };

        Ok(Correction::Applied(CorrectionResult {
            outcome,
            di_before,
            di_after: di,
            eligible,
            cap,
            flips,
        }))
    }

    /// Write the flips into a per-record prediction vector indexed by
    /// batch position.
    pub fn apply(result: &CorrectionResult, predictions: &mut [Option<u8>]) {
        for flip in &result.flips {
            if let Some(slot) = predictions.get_mut(flip.index) {
                *slot = Some(1);
            }
        }
    }
}
