// ─────────────────────────────────────────────────────────────────────
// Fairness Debt Governor — Fairness Metric Interface
// ─────────────────────────────────────────────────────────────────────
//! Pluggable fairness metric consumed by the monitor.
//!
//! The built-in metric is classification disparate impact. Other metric
//! families plug in behind the same trait; bindings can delegate to a
//! host-language implementation through `ExternalMetric`.

use fairdebt_types::{FairnessError, FairnessResult, GroupStats, MetricKind, ScoredRecord};

/// Trait for fairness metric backends.
///
/// Returns a ratio-style score where `fairness_threshold` is the
/// acceptance floor. `Err(UndefinedDisparateImpact)` means the batch
/// carries no usable signal.
pub trait FairnessMetric: Send + Sync {
    fn kind(&self) -> MetricKind;

    fn measure(
        &self,
        disadvantaged: &[ScoredRecord],
        advantaged: &[ScoredRecord],
    ) -> FairnessResult<f64>;
}

/// Count members and positive predictions.
pub fn group_stats(records: &[ScoredRecord]) -> GroupStats {
    GroupStats {
        count: records.len(),
        positives: records.iter().filter(|r| r.is_positive()).count(),
    }
}

/// `positive_rate(disadvantaged) / positive_rate(advantaged)`.
pub fn disparate_impact(disadvantaged: &GroupStats, advantaged: &GroupStats) -> FairnessResult<f64> {
    let adv_rate = advantaged.positive_rate().ok_or_else(|| {
        FairnessError::UndefinedDisparateImpact("advantaged group is empty".to_string())
    })?;
    let dis_rate = disadvantaged.positive_rate().ok_or_else(|| {
        FairnessError::UndefinedDisparateImpact("disadvantaged group is empty".to_string())
    })?;
    if adv_rate == 0.0 {
        return Err(FairnessError::UndefinedDisparateImpact(
            "advantaged positive rate is zero".to_string(),
        ));
    }
    Ok(dis_rate / adv_rate)
}

/// Measure with `metric`, treating non-finite or negative scores as
/// undefined.
pub fn checked_measure(
    metric: &dyn FairnessMetric,
    disadvantaged: &[ScoredRecord],
    advantaged: &[ScoredRecord],
) -> FairnessResult<f64> {
    let value = metric.measure(disadvantaged, advantaged)?;
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(FairnessError::UndefinedDisparateImpact(format!(
            "{:?} metric returned {value}",
            metric.kind()
        )))
    }
}

/// Classification disparate impact on binary predictions.
pub struct DisparateImpact;

impl FairnessMetric for DisparateImpact {
    fn kind(&self) -> MetricKind {
        MetricKind::ClassificationDisparateImpact
    }

    fn measure(
        &self,
        disadvantaged: &[ScoredRecord],
        advantaged: &[ScoredRecord],
    ) -> FairnessResult<f64> {
        disparate_impact(&group_stats(disadvantaged), &group_stats(advantaged))
    }
}

/// External metric that calls a function pointer.
///
/// Non-finite results are reported as undefined.
type MeasureFn = Box<dyn Fn(&[ScoredRecord], &[ScoredRecord]) -> Option<f64> + Send + Sync>;

pub struct ExternalMetric {
    kind: MetricKind,
    measure_fn: MeasureFn,
}

impl ExternalMetric {
    pub fn new(
        kind: MetricKind,
        measure_fn: impl Fn(&[ScoredRecord], &[ScoredRecord]) -> Option<f64> + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            measure_fn: Box::new(measure_fn),
        }
    }
}

impl FairnessMetric for ExternalMetric {
    fn kind(&self) -> MetricKind {
        self.kind
    }

    fn measure(
        &self,
        disadvantaged: &[ScoredRecord],
        advantaged: &[ScoredRecord],
    ) -> FairnessResult<f64> {
        match (self.measure_fn)(disadvantaged, advantaged) {
            Some(v) if v.is_finite() && v >= 0.0 => Ok(v),
            Some(v) => Err(FairnessError::UndefinedDisparateImpact(format!(
                "external metric returned {v}"
            ))),
            None => Err(FairnessError::UndefinedDisparateImpact(
                "external metric returned no value".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fairdebt_types::Group;

    fn records(group: Group, positives: usize, negatives: usize) -> Vec<ScoredRecord> {
        (0..positives + negatives)
            .map(|i| ScoredRecord {
                index: i,
                group,
                prediction: u8::from(i < positives),
                boundary_distance: None,
            })
            .collect()
    }

    #[test]
    fn test_disparate_impact_ratio() {
        let d = records(Group::Disadvantaged, 2, 8);
        let a = records(Group::Advantaged, 8, 2);
        let di = DisparateImpact.measure(&d, &a).unwrap();
        assert!((di - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_disparate_impact_zero_advantaged_rate() {
        let d = records(Group::Disadvantaged, 2, 8);
        let a = records(Group::Advantaged, 0, 10);
        assert!(matches!(
            DisparateImpact.measure(&d, &a),
            Err(FairnessError::UndefinedDisparateImpact(_))
        ));
    }

    #[test]
    fn test_disparate_impact_empty_groups() {
        let d = records(Group::Disadvantaged, 2, 8);
        assert!(DisparateImpact.measure(&d, &[]).is_err());
        let a = records(Group::Advantaged, 5, 5);
        assert!(DisparateImpact.measure(&[], &a).is_err());
    }

    #[test]
    fn test_disparate_impact_above_one() {
        let d = records(Group::Disadvantaged, 9, 1);
        let a = records(Group::Advantaged, 3, 7);
        assert!(DisparateImpact.measure(&d, &a).unwrap() > 1.0);
    }

    #[test]
    fn test_external_metric() {
        let metric = ExternalMetric::new(MetricKind::RegressionParity, |_, _| Some(0.42));
        assert_eq!(metric.kind(), MetricKind::RegressionParity);
        assert!((metric.measure(&[], &[]).unwrap() - 0.42).abs() < 1e-9);
    }

    #[test]
    fn test_external_metric_nan_is_undefined() {
        let metric = ExternalMetric::new(MetricKind::TextBias, |_, _| Some(f64::NAN));
        assert!(metric.measure(&[], &[]).is_err());
    }

    struct Constant(f64);

    impl FairnessMetric for Constant {
        fn kind(&self) -> MetricKind {
            MetricKind::RankingExposure
        }

        fn measure(&self, _: &[ScoredRecord], _: &[ScoredRecord]) -> FairnessResult<f64> {
            Ok(self.0)
        }
    }

    #[test]
    fn test_checked_measure_rejects_invalid_scores() {
        assert!((checked_measure(&Constant(0.5), &[], &[]).unwrap() - 0.5).abs() < 1e-9);
        for bad in [f64::NAN, f64::INFINITY, -0.1] {
            assert!(matches!(
                checked_measure(&Constant(bad), &[], &[]),
                Err(FairnessError::UndefinedDisparateImpact(_))
            ));
        }
    }
}
