// ─────────────────────────────────────────────────────────────────────
// Fairness Debt Governor — Fairness Monitor
// ─────────────────────────────────────────────────────────────────────
//! Stateless per-batch measurement: record validation, stream
//! partitioning, disparate impact, risk, and severity-weighted debt
//! contribution.
//!
//! `Risk = max(0, fairness_threshold - DI)` and
//! `ΔD = H * Risk * batch_size`. All state lives in the ledger.

use std::collections::BTreeMap;
use std::sync::Arc;

use fairdebt_types::{
    Assessment, Batch, BatchRecord, FairnessError, FairnessResult, Group, MetricKind,
    MonitorConfig, ScoredRecord, StreamKey,
};

use crate::metric::{checked_measure, group_stats, DisparateImpact, FairnessMetric};

/// Absolute tolerance when comparing DI against the fairness threshold,
/// so that ratios landing exactly on the threshold are not lost to
/// rounding.
pub const DI_TOLERANCE: f64 = 1e-12;

/// `di >= threshold`, within `DI_TOLERANCE`.
#[inline]
pub fn meets_threshold(di: f64, threshold: f64) -> bool {
    di + DI_TOLERANCE >= threshold
}

/// `max(0, threshold - di)`; exactly 0 when the threshold is met.
#[inline]
pub fn shortfall(di: f64, threshold: f64) -> f64 {
    if meets_threshold(di, threshold) {
        0.0
    } else {
        threshold - di
    }
}

/// A batch split into group-pair streams.
#[derive(Debug, Default)]
pub struct Partition {
    /// Valid records per stream, in batch order.
    pub streams: BTreeMap<StreamKey, Vec<ScoredRecord>>,
    /// Rejected records; each error is `MalformedRecord`.
    pub rejected: Vec<FairnessError>,
    /// Some record carried the protected attribute key.
    pub protected_observed: bool,
    /// Some valid record belongs to the disadvantaged group.
    pub disadvantaged_observed: bool,
}

impl Partition {
    pub fn valid_records(&self) -> usize {
        self.streams.values().map(Vec::len).sum()
    }
}

/// Computes disparate impact, risk, and debt contribution per batch.
pub struct FairnessMonitor {
    config: Arc<MonitorConfig>,
    metric: Arc<dyn FairnessMetric>,
    severity: f64,
}

impl FairnessMonitor {
    /// Monitor using the built-in disparate impact metric.
    pub fn new(config: MonitorConfig) -> FairnessResult<Self> {
        Self::with_metric(config, Arc::new(DisparateImpact))
    }

    /// Monitor using a supplied metric whose kind matches the config.
    pub fn with_metric(config: MonitorConfig, metric: Arc<dyn FairnessMetric>) -> FairnessResult<Self> {
        config.validate()?;
        if metric.kind() != config.metric {
            return Err(FairnessError::Configuration(format!(
                "metric {:?} configured but {:?} supplied",
                config.metric,
                metric.kind()
            )));
        }
        if config.metric != MetricKind::ClassificationDisparateImpact {
            log::warn!(
                "Monitoring with non-classification metric {:?}; correction still flips binary predictions",
                config.metric
            );
        }
        let severity = config.severity();
        Ok(Self {
            config: Arc::new(config),
            metric,
            severity,
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Metric used for assessment and correction.
    pub fn metric(&self) -> &dyn FairnessMetric {
        self.metric.as_ref()
    }

    /// Severity weight H for the session's domain.
    pub fn severity(&self) -> f64 {
        self.severity
    }

    /// Validate one record and place it in its stream.
    pub fn classify(&self, index: usize, record: &BatchRecord) -> FairnessResult<(StreamKey, ScoredRecord)> {
        let malformed = |reason: String| FairnessError::MalformedRecord { index, reason };

        let value = record
            .attribute(&self.config.protected_attribute)
            .ok_or_else(|| {
                malformed(format!(
                    "missing protected attribute '{}'",
                    self.config.protected_attribute
                ))
            })?;

        let prediction = match record.prediction {
            Some(0) => 0u8,
            Some(1) => 1u8,
            Some(p) => return Err(malformed(format!("prediction {p} not in {{0, 1}}"))),
            None => return Err(malformed("missing prediction".to_string())),
        };

        if let Some(d) = record.boundary_distance {
            if !d.is_finite() {
                return Err(malformed(format!("boundary_distance {d} is not finite")));
            }
        }

        let mut stream = BTreeMap::new();
        for attr in &self.config.intersectional_attributes {
            let v = record
                .attribute(attr)
                .ok_or_else(|| malformed(format!("missing intersectional attribute '{attr}'")))?;
            stream.insert(attr.clone(), v.to_string());
        }

        let group = if value == self.config.disadvantaged_group {
            Group::Disadvantaged
        } else {
            Group::Advantaged
        };

        Ok((
            StreamKey::new(stream),
            ScoredRecord {
                index,
                group,
                prediction,
                boundary_distance: record.boundary_distance,
            },
        ))
    }

    /// Validate every record and split the batch into streams.
    /// Malformed records are excluded, not fatal.
    pub fn partition(&self, batch: &Batch) -> Partition {
        let mut partition = Partition::default();
        for (index, record) in batch.records.iter().enumerate() {
            if record.attribute(&self.config.protected_attribute).is_some() {
                partition.protected_observed = true;
            }
            match self.classify(index, record) {
                Ok((stream, scored)) => {
                    if scored.group == Group::Disadvantaged {
                        partition.disadvantaged_observed = true;
                    }
                    partition.streams.entry(stream).or_default().push(scored);
                }
                Err(e) => partition.rejected.push(e),
            }
        }
        partition
    }

    /// Measure one stream's records for this batch.
    ///
    /// An undefined DI yields zero risk and zero contribution; the
    /// reason is kept in `undefined_reason`.
    pub fn assess(&self, stream: &StreamKey, records: &[ScoredRecord]) -> Assessment {
        let (disadvantaged, advantaged): (Vec<ScoredRecord>, Vec<ScoredRecord>) = records
            .iter()
            .copied()
            .partition(|r| r.group == Group::Disadvantaged);

        let batch_size = records.len();
        let (di, undefined_reason) = match checked_measure(self.metric(), &disadvantaged, &advantaged) {
            Ok(di) => (Some(di), None),
            Err(e) => (None, Some(e.to_string())),
        };

        let risk = di
            .map(|d| shortfall(d, self.config.fairness_threshold))
            .unwrap_or(0.0);
        let delta_debt = self.severity * risk * batch_size as f64;

        Assessment {
            stream: stream.clone(),
            disadvantaged: group_stats(&disadvantaged),
            advantaged: group_stats(&advantaged),
            di,
            risk,
            delta_debt,
            batch_size,
            undefined_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fairdebt_types::{BatchRecord, SeverityWeight};

    fn config() -> MonitorConfig {
        MonitorConfig::new("sex", "f")
    }

    /// `dis_pos` of `dis_n` disadvantaged positive, `adv_pos` of `adv_n`
    /// advantaged positive.
    fn batch(dis_pos: usize, dis_n: usize, adv_pos: usize, adv_n: usize) -> Batch {
        let mut records = Vec::new();
        for i in 0..dis_n {
            records.push(BatchRecord::new("sex", "f", u8::from(i < dis_pos)));
        }
        for i in 0..adv_n {
            records.push(BatchRecord::new("sex", "m", u8::from(i < adv_pos)));
        }
        Batch::new("b", records)
    }

    fn assess(monitor: &FairnessMonitor, b: &Batch) -> Assessment {
        let partition = monitor.partition(b);
        let records = &partition.streams[&StreamKey::overall()];
        monitor.assess(&StreamKey::overall(), records)
    }

    #[test]
    fn test_reference_scenario() {
        // 0.2 vs 0.8 → DI 0.25, Risk 0.55, ΔD = 1 * 0.55 * 100 = 55
        let monitor = FairnessMonitor::new(config()).unwrap();
        let a = assess(&monitor, &batch(10, 50, 40, 50));
        assert!((a.di.unwrap() - 0.25).abs() < 1e-9);
        assert!((a.risk - 0.55).abs() < 1e-9);
        assert_eq!(a.batch_size, 100);
        assert!((a.delta_debt - 55.0).abs() < 1e-9);
    }

    #[test]
    fn test_fair_batch_has_zero_risk() {
        let monitor = FairnessMonitor::new(config()).unwrap();
        let a = assess(&monitor, &batch(4, 10, 5, 10));
        assert!((a.di.unwrap() - 0.8).abs() < 1e-9);
        assert_eq!(a.risk, 0.0);
        assert_eq!(a.delta_debt, 0.0);
    }

    #[test]
    fn test_severity_weight_scales_contribution() {
        let mut cfg = config();
        cfg.severity_weight = SeverityWeight::Scalar(2.0);
        let monitor = FairnessMonitor::new(cfg).unwrap();
        let a = assess(&monitor, &batch(10, 50, 40, 50));
        assert!((a.delta_debt - 110.0).abs() < 1e-9);
    }

    #[test]
    fn test_undefined_when_advantaged_rate_zero() {
        let monitor = FairnessMonitor::new(config()).unwrap();
        let a = assess(&monitor, &batch(3, 10, 0, 10));
        assert!(a.di.is_none());
        assert_eq!(a.risk, 0.0);
        assert_eq!(a.delta_debt, 0.0);
        assert!(a.undefined_reason.unwrap().contains("zero"));
    }

    #[test]
    fn test_malformed_records_excluded() {
        let monitor = FairnessMonitor::new(config()).unwrap();
        let mut b = batch(1, 2, 2, 2);
        b.records.push(BatchRecord::default());
        b.records.push(BatchRecord {
            prediction: Some(3),
            ..BatchRecord::new("sex", "m", 0)
        });
        b.records.push(BatchRecord::new("sex", "f", 0).with_distance(f64::NAN));
        let partition = monitor.partition(&b);
        assert_eq!(partition.rejected.len(), 3);
        assert_eq!(partition.valid_records(), 4);
        assert!(matches!(
            partition.rejected[0],
            FairnessError::MalformedRecord { index: 4, .. }
        ));
    }

    #[test]
    fn test_observation_flags() {
        let monitor = FairnessMonitor::new(config()).unwrap();
        let b = Batch::new("b", vec![BatchRecord::new("race", "x", 1)]);
        let p = monitor.partition(&b);
        assert!(!p.protected_observed);
        assert!(!p.disadvantaged_observed);

        let b = Batch::new("b", vec![BatchRecord::new("sex", "m", 1)]);
        let p = monitor.partition(&b);
        assert!(p.protected_observed);
        assert!(!p.disadvantaged_observed);
    }

    #[test]
    fn test_intersectional_partition() {
        let mut cfg = config();
        cfg.intersectional_attributes = vec!["age".into()];
        let monitor = FairnessMonitor::new(cfg).unwrap();
        let b = Batch::new(
            "b",
            vec![
                BatchRecord::new("sex", "f", 0).with_attribute("age", "young"),
                BatchRecord::new("sex", "m", 1).with_attribute("age", "young"),
                BatchRecord::new("sex", "f", 1).with_attribute("age", "old"),
                BatchRecord::new("sex", "m", 1).with_attribute("age", "old"),
                BatchRecord::new("sex", "m", 1),
            ],
        );
        let p = monitor.partition(&b);
        assert_eq!(p.streams.len(), 2);
        assert_eq!(p.rejected.len(), 1);
        for records in p.streams.values() {
            assert_eq!(records.len(), 2);
        }
    }

    #[test]
    fn test_unsupported_metric_without_backend() {
        let mut cfg = config();
        cfg.metric = MetricKind::TextBias;
        assert!(matches!(
            FairnessMonitor::new(cfg),
            Err(FairnessError::Configuration(_))
        ));
    }

    #[test]
    fn test_external_metric_of_matching_kind() {
        use crate::metric::ExternalMetric;
        let mut cfg = config();
        cfg.metric = MetricKind::RegressionParity;
        let metric = Arc::new(ExternalMetric::new(MetricKind::RegressionParity, |_, _| Some(0.5)));
        let monitor = FairnessMonitor::with_metric(cfg, metric).unwrap();
        let a = assess(&monitor, &batch(1, 2, 1, 2));
        assert!((a.di.unwrap() - 0.5).abs() < 1e-9);
        assert!((a.risk - 0.3).abs() < 1e-9);
    }

    struct NotANumber;

    impl FairnessMetric for NotANumber {
        fn kind(&self) -> MetricKind {
            MetricKind::RankingExposure
        }

        fn measure(&self, _: &[ScoredRecord], _: &[ScoredRecord]) -> FairnessResult<f64> {
            Ok(f64::NAN)
        }
    }

    #[test]
    fn test_non_finite_metric_output_is_undefined() {
        let mut cfg = config();
        cfg.metric = MetricKind::RankingExposure;
        let monitor = FairnessMonitor::with_metric(cfg, Arc::new(NotANumber)).unwrap();
        let a = assess(&monitor, &batch(10, 50, 40, 50));
        assert!(a.di.is_none());
        assert_eq!(a.risk, 0.0);
        assert_eq!(a.delta_debt, 0.0);
        assert!(a.undefined_reason.unwrap().contains("NaN"));
    }
}
