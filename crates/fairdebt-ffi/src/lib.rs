// ─────────────────────────────────────────────────────────────────────
// Fairness Debt Governor — PyO3 FFI Bindings
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
// Note: #[deny(unsafe_code)] not applied — PyO3 proc macros generate
// unsafe blocks internally. All hand-written code in this crate is safe.
//! Python-callable wrappers around the fairness governor.
//!
//! Exposes `MonitorConfig`, `FairnessGovernor`, and `BatchOutcome` to
//! the Python ingestion pipeline via PyO3.
//!
//! # FFI Safety
//!
//! - GIL acquired via `Python::with_gil` before every Python callback.
//! - The audit callback runs after stream locks are released, and every
//!   method that takes a stream lock releases the GIL first.
//! - A raising audit callback is logged and never interrupts monitoring.
//! - All config validated before storage (`MonitorConfig::validate()`).
//!
//! Install: `pip install -e crates/fairdebt-ffi` (requires maturin,
//! which enables the `extension-module` feature).
//!
//! Usage from Python:
//! ```python
//! from fairdebt import MonitorConfig, FairnessGovernor
//!
//! cfg = MonitorConfig("sex", "female", governance_threshold=15.0, correction_strength=0.6)
//! gov = FairnessGovernor(cfg)
//! out = gov.process_batch("b-1", ["female", "male"], [0, 1], [-0.05, 0.4])
//! preds, intervened, di, debt, audit = out.to_tuple()
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use fairdebt_core::{
    ExternalSink, FairnessGovernor, GovernorSnapshot, MonotonicClock,
};
use fairdebt_types::{
    Batch, BatchOutcome, BatchRecord, FairnessError, MonitorConfig, SeverityWeight, StreamKey,
};

fn to_py_err(e: FairnessError) -> PyErr {
    match e {
        FairnessError::Configuration(_)
        | FairnessError::Validation(_)
        | FairnessError::MalformedRecord { .. }
        | FairnessError::OutOfOrder { .. } => PyValueError::new_err(e.to_string()),
        _ => PyRuntimeError::new_err(e.to_string()),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> PyResult<String> {
    serde_json::to_string(value).map_err(|e| PyRuntimeError::new_err(e.to_string()))
}

fn stream_key(stream: Option<BTreeMap<String, String>>) -> StreamKey {
    stream.map(StreamKey::new).unwrap_or_default()
}

// ─── PyMonitorConfig ────────────────────────────────────────────────

/// Python-visible session configuration.
#[pyclass(name = "MonitorConfig")]
#[derive(Clone)]
struct PyMonitorConfig {
    inner: MonitorConfig,
}

#[pymethods]
impl PyMonitorConfig {
    #[new]
    #[pyo3(signature = (
        protected_attribute,
        disadvantaged_group,
        fairness_threshold = 0.8,
        governance_threshold = 15.0,
        correction_strength = 0.5,
        severity_weight = 1.0,
        intersectional_attributes = None,
    ))]
    fn new(
        protected_attribute: String,
        disadvantaged_group: String,
        fairness_threshold: f64,
        governance_threshold: f64,
        correction_strength: f64,
        severity_weight: f64,
        intersectional_attributes: Option<Vec<String>>,
    ) -> PyResult<Self> {
        let mut config = MonitorConfig::new(protected_attribute, disadvantaged_group);
        config.fairness_threshold = fairness_threshold;
        config.governance_threshold = governance_threshold;
        config.correction_strength = correction_strength;
        config.severity_weight = SeverityWeight::Scalar(severity_weight);
        config.intersectional_attributes = intersectional_attributes.unwrap_or_default();
        config.validate().map_err(to_py_err)?;
        Ok(Self { inner: config })
    }

    /// Construct from JSON string (supports calibrated severity tables
    /// and stream overrides).
    #[staticmethod]
    fn from_json(json: &str) -> PyResult<Self> {
        let config = MonitorConfig::from_json(json).map_err(to_py_err)?;
        config.validate().map_err(to_py_err)?;
        Ok(Self { inner: config })
    }

    fn to_json(&self) -> PyResult<String> {
        self.inner.to_json().map_err(to_py_err)
    }

    fn __repr__(&self) -> String {
        format!(
            "MonitorConfig(protected_attribute={:?}, disadvantaged_group={:?}, fairness_threshold={}, governance_threshold={}, correction_strength={})",
            self.inner.protected_attribute,
            self.inner.disadvantaged_group,
            self.inner.fairness_threshold,
            self.inner.governance_threshold,
            self.inner.correction_strength
        )
    }
}

// ─── PyBatchOutcome ─────────────────────────────────────────────────

/// Python-visible result of one per-batch call.
#[pyclass(name = "BatchOutcome")]
#[derive(Clone)]
struct PyBatchOutcome {
    inner: BatchOutcome,
}

#[pymethods]
impl PyBatchOutcome {
    #[getter]
    fn batch_id(&self) -> &str {
        &self.inner.batch_id
    }

    #[getter]
    fn timestamp_s(&self) -> f64 {
        self.inner.timestamp_s
    }

    #[getter]
    fn corrected_predictions(&self) -> Vec<Option<u8>> {
        self.inner.corrected_predictions.clone()
    }

    #[getter]
    fn intervened(&self) -> bool {
        self.inner.intervened()
    }

    /// Reported DI of the first stream (the only one without
    /// intersectional attributes).
    #[getter]
    fn di(&self) -> Option<f64> {
        self.inner.streams.first().and_then(|s| s.reported_di)
    }

    /// Debt of the first stream after this batch.
    #[getter]
    fn debt(&self) -> f64 {
        self.inner.streams.first().map(|s| s.debt).unwrap_or(0.0)
    }

    /// Audit entries produced by this batch, as JSON strings.
    #[getter]
    fn audit_entries(&self) -> PyResult<Vec<String>> {
        self.inner.audit_entries().map(to_json).collect()
    }

    /// Warnings, as JSON strings.
    #[getter]
    fn warnings(&self) -> PyResult<Vec<String>> {
        self.inner.warnings.iter().map(to_json).collect()
    }

    /// `(corrected_predictions, intervened, di, debt, audit_entry_json)`.
    fn to_tuple(&self) -> PyResult<(Vec<Option<u8>>, bool, Option<f64>, f64, Option<String>)> {
        let audit = match self.inner.audit_entries().next() {
            Some(entry) => Some(to_json(entry)?),
            None => None,
        };
        Ok((
            self.inner.corrected_predictions.clone(),
            self.inner.intervened(),
            self.di(),
            self.debt(),
            audit,
        ))
    }

    fn to_json(&self) -> PyResult<String> {
        to_json(&self.inner)
    }

    fn __repr__(&self) -> String {
        format!(
            "BatchOutcome(batch_id={:?}, streams={}, intervened={}, warnings={})",
            self.inner.batch_id,
            self.inner.streams.len(),
            self.inner.intervened(),
            self.inner.warnings.len()
        )
    }
}

// ─── PyFairnessGovernor ─────────────────────────────────────────────

/// Temporal fairness governor exposed to Python.
#[pyclass(name = "FairnessGovernor")]
struct PyFairnessGovernor {
    inner: FairnessGovernor,
}

fn with_audit_callback(governor: FairnessGovernor, callback: Option<PyObject>) -> FairnessGovernor {
    match callback {
        Some(cb) => governor.with_audit_sink(Arc::new(ExternalSink::new(move |event| {
            let json = serde_json::to_string(event)?;
            Python::with_gil(|py| cb.call1(py, (json,)))
                .map(|_| ())
                .map_err(|e| FairnessError::Serialization(format!("audit callback raised: {e}")))
        }))),
        None => governor,
    }
}

#[pymethods]
impl PyFairnessGovernor {
    /// Create a governor.
    ///
    /// Args:
    ///     config: MonitorConfig.
    ///     audit_callback: Optional Callable[[str], None] receiving each
    ///                     audit entry as JSON.
    #[new]
    #[pyo3(signature = (config, audit_callback = None))]
    fn new(config: PyMonitorConfig, audit_callback: Option<PyObject>) -> PyResult<Self> {
        let governor = FairnessGovernor::new(config.inner).map_err(to_py_err)?;
        Ok(Self {
            inner: with_audit_callback(governor, audit_callback),
        })
    }

    /// Resume from `snapshot_json()` output.
    #[staticmethod]
    #[pyo3(signature = (config, snapshot_json, audit_callback = None))]
    fn restore(
        config: PyMonitorConfig,
        snapshot_json: &str,
        audit_callback: Option<PyObject>,
    ) -> PyResult<Self> {
        let snapshot = GovernorSnapshot::from_json(snapshot_json).map_err(to_py_err)?;
        let clock = Arc::new(MonotonicClock::starting_at(snapshot.taken_at_s));
        let governor = FairnessGovernor::restore(config.inner, snapshot, clock).map_err(to_py_err)?;
        Ok(Self {
            inner: with_audit_callback(governor, audit_callback),
        })
    }

    /// Process one batch given column-wise record fields.
    ///
    /// Args:
    ///     batch_id: Batch identifier.
    ///     protected_values: Protected-attribute value per record (None = missing).
    ///     predictions: 0/1 prediction per record (None = missing).
    ///     boundary_distances: Optional signed boundary distance per record.
    ///     attributes: Optional extra attributes per record (intersectional keys).
    ///     observed_at_s: Optional event time in session seconds.
    #[pyo3(signature = (
        batch_id,
        protected_values,
        predictions,
        boundary_distances = None,
        attributes = None,
        observed_at_s = None,
    ))]
    fn process_batch(
        &self,
        py: Python<'_>,
        batch_id: String,
        protected_values: Vec<Option<String>>,
        predictions: Vec<Option<i64>>,
        boundary_distances: Option<Vec<Option<f64>>>,
        attributes: Option<Vec<BTreeMap<String, String>>>,
        observed_at_s: Option<f64>,
    ) -> PyResult<PyBatchOutcome> {
        let n = protected_values.len();
        if predictions.len() != n
            || boundary_distances.as_ref().is_some_and(|d| d.len() != n)
            || attributes.as_ref().is_some_and(|a| a.len() != n)
        {
            return Err(PyValueError::new_err(
                "record columns must all have the same length",
            ));
        }

        let protected = self.inner.config().protected_attribute.clone();
        let mut records = Vec::with_capacity(n);
        for i in 0..n {
            let mut record = BatchRecord {
                attributes: attributes
                    .as_ref()
                    .map(|a| a[i].clone())
                    .unwrap_or_default(),
                prediction: predictions[i],
                boundary_distance: boundary_distances.as_ref().and_then(|d| d[i]),
            };
            if let Some(value) = &protected_values[i] {
                record.attributes.insert(protected.clone(), value.clone());
            }
            records.push(record);
        }
        let batch = Batch {
            batch_id,
            observed_at_s,
            records,
        };

        let outcome = py
            .allow_threads(|| self.inner.process_batch(&batch))
            .map_err(to_py_err)?;
        Ok(PyBatchOutcome { inner: outcome })
    }

    /// Process one batch given as JSON (`{"batch_id", "records": [...]}`).
    fn process_batch_json(&self, py: Python<'_>, batch_json: &str) -> PyResult<PyBatchOutcome> {
        let batch: Batch = serde_json::from_str(batch_json)
            .map_err(|e| PyValueError::new_err(format!("invalid batch JSON: {e}")))?;
        let outcome = py
            .allow_threads(|| self.inner.process_batch(&batch))
            .map_err(to_py_err)?;
        Ok(PyBatchOutcome { inner: outcome })
    }

    // Getters release the GIL while waiting on stream locks: a batch
    // holding those locks may itself be waiting for the GIL.

    #[pyo3(signature = (stream = None))]
    fn debt(&self, py: Python<'_>, stream: Option<BTreeMap<String, String>>) -> Option<f64> {
        let key = stream_key(stream);
        py.allow_threads(|| self.inner.debt(&key))
    }

    #[pyo3(signature = (stream = None))]
    fn mttfr(&self, py: Python<'_>, stream: Option<BTreeMap<String, String>>) -> Option<f64> {
        let key = stream_key(stream);
        py.allow_threads(|| self.inner.mttfr(&key))
    }

    #[pyo3(signature = (stream = None))]
    fn exceeds_threshold(&self, py: Python<'_>, stream: Option<BTreeMap<String, String>>) -> bool {
        let key = stream_key(stream);
        py.allow_threads(|| self.inner.exceeds_threshold(&key))
    }

    /// All audit entries, one JSON object per line.
    fn audit_jsonl(&self, py: Python<'_>) -> PyResult<String> {
        let entries = py.allow_threads(|| self.inner.audit_entries());
        let mut out = String::new();
        for entry in &entries {
            out.push_str(&to_json(entry)?);
            out.push('\n');
        }
        Ok(out)
    }

    fn report_json(&self, py: Python<'_>) -> PyResult<String> {
        py.allow_threads(|| self.inner.report().to_json())
            .map_err(to_py_err)
    }

    fn snapshot_json(&self, py: Python<'_>) -> PyResult<String> {
        py.allow_threads(|| self.inner.snapshot().to_json())
            .map_err(to_py_err)
    }

    fn __repr__(&self) -> String {
        format!(
            "FairnessGovernor(streams={}, protected_attribute={:?})",
            self.inner.stream_keys().len(),
            self.inner.config().protected_attribute
        )
    }
}

/// Python module definition.
///
/// Exports:
/// - `MonitorConfig` — session configuration
/// - `FairnessGovernor` — debt ledger, correction, MTTFR, audit
/// - `BatchOutcome` — per-batch result
#[pymodule]
fn fairdebt(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyMonitorConfig>()?;
    m.add_class::<PyBatchOutcome>()?;
    m.add_class::<PyFairnessGovernor>()?;
    Ok(())
}
