// ─────────────────────────────────────────────────────────────────────
// Fairness Debt Governor — Session Configuration
// ─────────────────────────────────────────────────────────────────────

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{FairnessError, FairnessResult};
use crate::record::StreamKey;

/// Enumerated application domains with their own harm calibration.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DomainKey {
    #[default]
    General,
    Lending,
    Hiring,
    Housing,
    Healthcare,
    CriminalJustice,
    Education,
    Insurance,
}

/// Severity weight H: converts a fairness shortfall into harm units.
///
/// Either a single scalar, or a calibration table keyed by domain with
/// a required default for domains the table does not list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SeverityWeight {
    Scalar(f64),
    Calibrated {
        default: f64,
        #[serde(default)]
        domains: BTreeMap<DomainKey, f64>,
    },
}

impl Default for SeverityWeight {
    fn default() -> Self {
        SeverityWeight::Scalar(1.0)
    }
}

impl SeverityWeight {
    /// Weight applied to batches of the given domain.
    pub fn weight_for(&self, domain: DomainKey) -> f64 {
        match self {
            SeverityWeight::Scalar(h) => *h,
            SeverityWeight::Calibrated { default, domains } => {
                domains.get(&domain).copied().unwrap_or(*default)
            }
        }
    }

    fn validate(&self) -> FairnessResult<()> {
        let check = |label: String, h: f64| {
            if h.is_finite() && h > 0.0 {
                Ok(())
            } else {
                Err(FairnessError::Configuration(format!(
                    "{label} must be finite and > 0, got {h}"
                )))
            }
        };
        match self {
            SeverityWeight::Scalar(h) => check("severity_weight".to_string(), *h),
            SeverityWeight::Calibrated { default, domains } => {
                check("severity_weight.default".to_string(), *default)?;
                for (domain, h) in domains {
                    check(format!("severity_weight.domains.{domain:?}"), *h)?;
                }
                Ok(())
            }
        }
    }
}

/// Fairness metric family consumed by the monitor.
///
/// Only classification disparate impact is built in; the other families
/// need an externally supplied metric implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    #[default]
    ClassificationDisparateImpact,
    RegressionParity,
    RankingExposure,
    TextBias,
}

/// Per-stream override of governance threshold and correction strength.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamOverride {
    /// Intersectional attribute values identifying the stream.
    pub stream: BTreeMap<String, String>,
    #[serde(default)]
    pub governance_threshold: Option<f64>,
    #[serde(default)]
    pub correction_strength: Option<f64>,
}

/// Effective Γ and α for one group-pair stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamThresholds {
    pub governance_threshold: f64,
    pub correction_strength: f64,
}

/// Immutable configuration of a monitoring session.
///
/// Changing any value requires a new session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Record attribute holding the protected-group value.
    pub protected_attribute: String,

    /// Protected-attribute value identifying the disadvantaged group.
    pub disadvantaged_group: String,

    /// Minimum acceptable disparate impact, in (0, 1].
    pub fairness_threshold: f64,

    /// Governance threshold Γ: debt level that triggers correction.
    pub governance_threshold: f64,

    /// Correction strength α: max fraction of eligible candidates flipped.
    pub correction_strength: f64,

    /// Severity weight H. Default: scalar 1.0.
    #[serde(default)]
    pub severity_weight: SeverityWeight,

    /// Domain selecting the calibrated severity weight.
    #[serde(default)]
    pub domain: DomainKey,

    /// Attributes whose value combinations define independent streams.
    #[serde(default)]
    pub intersectional_attributes: Vec<String>,

    /// Γ/α overrides for specific intersectional streams.
    #[serde(default)]
    pub stream_overrides: Vec<StreamOverride>,

    #[serde(default)]
    pub metric: MetricKind,
}

impl MonitorConfig {
    /// Config with the given group definition and default thresholds:
    /// fairness 0.8 (four-fifths rule), Γ = 15, α = 0.5, H = 1.
    pub fn new(protected_attribute: impl Into<String>, disadvantaged_group: impl Into<String>) -> Self {
        Self {
            protected_attribute: protected_attribute.into(),
            disadvantaged_group: disadvantaged_group.into(),
            fairness_threshold: 0.8,
            governance_threshold: 15.0,
            correction_strength: 0.5,
            severity_weight: SeverityWeight::default(),
            domain: DomainKey::default(),
            intersectional_attributes: Vec::new(),
            stream_overrides: Vec::new(),
            metric: MetricKind::default(),
        }
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> FairnessResult<()> {
        if self.protected_attribute.trim().is_empty() {
            return Err(FairnessError::Configuration(
                "protected_attribute must not be empty".to_string(),
            ));
        }
        if self.disadvantaged_group.is_empty() {
            return Err(FairnessError::Configuration(
                "disadvantaged_group must not be empty".to_string(),
            ));
        }
        if !(self.fairness_threshold > 0.0 && self.fairness_threshold <= 1.0) {
            return Err(FairnessError::Configuration(format!(
                "fairness_threshold must be in (0, 1], got {}",
                self.fairness_threshold
            )));
        }
        check_governance_threshold(self.governance_threshold)?;
        check_correction_strength(self.correction_strength)?;
        self.severity_weight.validate()?;

        for (i, attr) in self.intersectional_attributes.iter().enumerate() {
            if attr.trim().is_empty() {
                return Err(FairnessError::Configuration(
                    "intersectional attribute names must not be empty".to_string(),
                ));
            }
            if *attr == self.protected_attribute {
                return Err(FairnessError::Configuration(format!(
                    "intersectional attribute '{attr}' duplicates the protected attribute"
                )));
            }
            if self.intersectional_attributes[..i].contains(attr) {
                return Err(FairnessError::Configuration(format!(
                    "intersectional attribute '{attr}' listed twice"
                )));
            }
        }

        for ov in &self.stream_overrides {
            if ov.stream.len() != self.intersectional_attributes.len()
                || !ov
                    .stream
                    .keys()
                    .all(|k| self.intersectional_attributes.contains(k))
            {
                return Err(FairnessError::Configuration(format!(
                    "stream override {:?} must name exactly the intersectional attributes {:?}",
                    ov.stream, self.intersectional_attributes
                )));
            }
            if let Some(gamma) = ov.governance_threshold {
                check_governance_threshold(gamma)?;
            }
            if let Some(alpha) = ov.correction_strength {
                check_correction_strength(alpha)?;
            }
        }
        Ok(())
    }

    /// Severity weight H for the session's domain.
    pub fn severity(&self) -> f64 {
        self.severity_weight.weight_for(self.domain)
    }

    /// Γ and α for a stream, after applying any matching override.
    pub fn thresholds_for(&self, stream: &StreamKey) -> StreamThresholds {
        let mut thresholds = StreamThresholds {
            governance_threshold: self.governance_threshold,
            correction_strength: self.correction_strength,
        };
        if let Some(ov) = self
            .stream_overrides
            .iter()
            .find(|ov| &ov.stream == stream.values())
        {
            if let Some(gamma) = ov.governance_threshold {
                thresholds.governance_threshold = gamma;
            }
            if let Some(alpha) = ov.correction_strength {
                thresholds.correction_strength = alpha;
            }
        }
        thresholds
    }

    /// Load from JSON string.
    pub fn from_json(json: &str) -> FairnessResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| FairnessError::Configuration(format!("JSON parse error: {e}")))
    }

    pub fn to_json(&self) -> FairnessResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn check_governance_threshold(gamma: f64) -> FairnessResult<()> {
    if !gamma.is_finite() || gamma < 0.0 {
        return Err(FairnessError::Configuration(format!(
            "governance_threshold must be finite and >= 0, got {gamma}"
        )));
    }
    Ok(())
}

fn check_correction_strength(alpha: f64) -> FairnessResult<()> {
    if !(0.0..=1.0).contains(&alpha) {
        return Err(FairnessError::Configuration(format!(
            "correction_strength must be in [0, 1], got {alpha}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> MonitorConfig {
        MonitorConfig::new("sex", "female")
    }

    #[test]
    fn test_new_is_valid() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn test_rejects_threshold_out_of_range() {
        let mut cfg = base();
        cfg.fairness_threshold = 1.2;
        assert!(matches!(cfg.validate(), Err(FairnessError::Configuration(_))));
        cfg.fairness_threshold = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_negative_gamma() {
        let mut cfg = base();
        cfg.governance_threshold = -1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_alpha_above_one() {
        let mut cfg = base();
        cfg.correction_strength = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_protected_attribute() {
        let mut cfg = base();
        cfg.protected_attribute = "  ".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_intersectional_duplicates() {
        let mut cfg = base();
        cfg.intersectional_attributes = vec!["age".into(), "age".into()];
        assert!(cfg.validate().is_err());
        cfg.intersectional_attributes = vec!["sex".into()];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_severity_scalar() {
        let mut cfg = base();
        cfg.severity_weight = SeverityWeight::Scalar(2.5);
        assert!((cfg.severity() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_severity_calibrated_uses_default_for_unlisted_domain() {
        let mut domains = BTreeMap::new();
        domains.insert(DomainKey::Lending, 3.0);
        let mut cfg = base();
        cfg.severity_weight = SeverityWeight::Calibrated {
            default: 1.5,
            domains,
        };
        cfg.domain = DomainKey::Lending;
        assert!((cfg.severity() - 3.0).abs() < 1e-9);
        cfg.domain = DomainKey::Hiring;
        assert!((cfg.severity() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_severity_rejects_zero_weight() {
        let mut cfg = base();
        cfg.severity_weight = SeverityWeight::Scalar(0.0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_from_json_scalar_weight() {
        let cfg = MonitorConfig::from_json(
            r#"{
                "protected_attribute": "race",
                "disadvantaged_group": "b",
                "fairness_threshold": 0.8,
                "governance_threshold": 15.0,
                "correction_strength": 0.6,
                "severity_weight": 2.0
            }"#,
        )
        .unwrap();
        assert!(cfg.validate().is_ok());
        assert!((cfg.severity() - 2.0).abs() < 1e-9);
        assert!(cfg.intersectional_attributes.is_empty());
        assert_eq!(cfg.metric, MetricKind::ClassificationDisparateImpact);
    }

    #[test]
    fn test_from_json_calibrated_weight() {
        let cfg = MonitorConfig::from_json(
            r#"{
                "protected_attribute": "race",
                "disadvantaged_group": "b",
                "fairness_threshold": 0.8,
                "governance_threshold": 15.0,
                "correction_strength": 0.6,
                "severity_weight": {"default": 1.0, "domains": {"criminal_justice": 4.0}},
                "domain": "criminal_justice"
            }"#,
        )
        .unwrap();
        assert!((cfg.severity() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_from_json_missing_required_field() {
        let err = MonitorConfig::from_json(r#"{"protected_attribute": "race"}"#);
        assert!(matches!(err, Err(FairnessError::Configuration(_))));
    }

    #[test]
    fn test_stream_override_applies() {
        let mut cfg = base();
        cfg.intersectional_attributes = vec!["age".into()];
        let mut stream = BTreeMap::new();
        stream.insert("age".to_string(), "young".to_string());
        cfg.stream_overrides.push(StreamOverride {
            stream: stream.clone(),
            governance_threshold: Some(5.0),
            correction_strength: None,
        });
        assert!(cfg.validate().is_ok());

        let young = StreamKey::new(stream);
        let t = cfg.thresholds_for(&young);
        assert!((t.governance_threshold - 5.0).abs() < 1e-9);
        assert!((t.correction_strength - 0.5).abs() < 1e-9);

        let t = cfg.thresholds_for(&StreamKey::overall());
        assert!((t.governance_threshold - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_stream_override_must_name_intersectional_attributes() {
        let mut cfg = base();
        let mut stream = BTreeMap::new();
        stream.insert("age".to_string(), "young".to_string());
        cfg.stream_overrides.push(StreamOverride {
            stream,
            governance_threshold: Some(5.0),
            correction_strength: None,
        });
        assert!(cfg.validate().is_err());
    }
}
