// ─────────────────────────────────────────────────────────────────────
// Fairness Debt Governor — Batch Record Schema
// ─────────────────────────────────────────────────────────────────────

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One classifier output as delivered by the ingestion pipeline.
///
/// Fields are optional on the wire so that malformed records can be
/// rejected individually instead of failing the whole batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    /// Protected and intersectional attribute values, by attribute key.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Binary prediction; must be 0 or 1.
    #[serde(default)]
    pub prediction: Option<i64>,
    /// Signed distance of the decision score from the classification
    /// threshold. Records without it are never flipped.
    #[serde(default)]
    pub boundary_distance: Option<f64>,
}

impl BatchRecord {
    pub fn new(attribute: impl Into<String>, value: impl Into<String>, prediction: u8) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert(attribute.into(), value.into());
        Self {
            attributes,
            prediction: Some(i64::from(prediction)),
            boundary_distance: None,
        }
    }

    pub fn with_distance(mut self, distance: f64) -> Self {
        self.boundary_distance = Some(distance);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// An ordered batch of records. Batches must arrive in temporal order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub batch_id: String,
    /// Event time in session seconds. When absent, the governor's
    /// clock stamps the batch on arrival.
    #[serde(default)]
    pub observed_at_s: Option<f64>,
    pub records: Vec<BatchRecord>,
}

impl Batch {
    pub fn new(batch_id: impl Into<String>, records: Vec<BatchRecord>) -> Self {
        Self {
            batch_id: batch_id.into(),
            observed_at_s: None,
            records,
        }
    }

    pub fn observed_at(mut self, timestamp_s: f64) -> Self {
        self.observed_at_s = Some(timestamp_s);
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Identifies one group-pair stream: the combination of intersectional
/// attribute values. Empty when no intersectional attributes are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamKey(BTreeMap<String, String>);

impl StreamKey {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self(values)
    }

    /// The single stream used when no intersectional attributes are set.
    pub fn overall() -> Self {
        Self::default()
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    pub fn is_overall(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("*");
        }
        let mut first = true;
        for (k, v) in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{k}={v}")?;
            first = false;
        }
        Ok(())
    }
}

/// Group membership of a validated record within its stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Group {
    Disadvantaged,
    Advantaged,
}

/// A validated record, positioned by its index in the original batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredRecord {
    pub index: usize,
    pub group: Group,
    /// Always 0 or 1.
    pub prediction: u8,
    pub boundary_distance: Option<f64>,
}

impl ScoredRecord {
    pub fn is_positive(&self) -> bool {
        self.prediction == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_key_display() {
        assert_eq!(StreamKey::overall().to_string(), "*");
        let mut values = BTreeMap::new();
        values.insert("region".to_string(), "north".to_string());
        values.insert("age".to_string(), "young".to_string());
        assert_eq!(StreamKey::new(values).to_string(), "age=young,region=north");
    }

    #[test]
    fn test_record_deserializes_with_missing_fields() {
        let rec: BatchRecord = serde_json::from_str(r#"{"attributes": {"sex": "f"}}"#).unwrap();
        assert_eq!(rec.attribute("sex"), Some("f"));
        assert!(rec.prediction.is_none());
        assert!(rec.boundary_distance.is_none());
    }

    #[test]
    fn test_batch_from_json() {
        let batch: Batch = serde_json::from_str(
            r#"{"batch_id": "b-1", "records": [
                {"attributes": {"sex": "f"}, "prediction": 0, "boundary_distance": -0.2},
                {"attributes": {"sex": "m"}, "prediction": 1}
            ]}"#,
        )
        .unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch.observed_at_s.is_none());
        assert_eq!(batch.records[0].boundary_distance, Some(-0.2));
    }

    #[test]
    fn test_builder() {
        let rec = BatchRecord::new("sex", "f", 0)
            .with_distance(0.3)
            .with_attribute("age", "young");
        assert_eq!(rec.prediction, Some(0));
        assert_eq!(rec.attribute("age"), Some("young"));
        assert_eq!(rec.boundary_distance, Some(0.3));
    }
}
