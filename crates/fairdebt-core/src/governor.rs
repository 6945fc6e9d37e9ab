// ─────────────────────────────────────────────────────────────────────
// Fairness Debt Governor — Per-Stream Governance Loop
// ─────────────────────────────────────────────────────────────────────
//! Runs the monitoring-and-correction cycle for every group-pair stream:
//!
//! ```text
//! assess → accumulate → D >= Γ ? → correct → reset (complete only)
//!                                          → MTTFR (complete only)
//!                                          → audit append
//! ```
//!
//! Each stream is an independently locked `StreamState`. A batch locks
//! the streams it touches in key order and holds them for the whole
//! cycle, so accumulate/reset never interleave for one stream while
//! disjoint streams proceed concurrently. Clock-stamped batches read the
//! clock only once those locks are held, so lock order is time order.
//! Audit sinks run after the locks are released.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use fairdebt_types::{
    Batch, BatchOutcome, CorrectionOutcome, FairnessError, FairnessResult, InterventionEvent,
    MonitorConfig, MonitorWarning, ScoredRecord, StreamKey, StreamOutcome, StreamThresholds,
};

use crate::audit::{self, AuditLog, AuditSink};
use crate::clock::{Clock, MonotonicClock};
use crate::corrector::{Correction, CorrectionResult, DirectBiasCorrector};
use crate::ledger::{DebtLedger, DebtState};
use crate::metric::FairnessMetric;
use crate::monitor::{FairnessMonitor, Partition};
use crate::mttfr::MttfrTracker;
use crate::report::{GovernanceReport, GovernorSnapshot, StreamReport, StreamSnapshot};

/// Exclusive state of one group-pair stream.
struct StreamState {
    key: StreamKey,
    thresholds: StreamThresholds,
    ledger: DebtLedger,
    corrector: DirectBiasCorrector,
    mttfr: MttfrTracker,
    audit: AuditLog,
    last_di: Option<f64>,
    last_timestamp_s: Option<f64>,
}

type SharedStream = Arc<Mutex<StreamState>>;

impl StreamState {
    fn new(config: &MonitorConfig, key: StreamKey, started_at_s: f64) -> Self {
        let thresholds = config.thresholds_for(&key);
        Self {
            key,
            thresholds,
            ledger: DebtLedger::new(thresholds.governance_threshold),
            corrector: DirectBiasCorrector::new(
                config.fairness_threshold,
                thresholds.correction_strength,
            ),
            mttfr: MttfrTracker::new(started_at_s),
            audit: AuditLog::new(),
            last_di: None,
            last_timestamp_s: None,
        }
    }

    fn restore(
        config: &MonitorConfig,
        snapshot: StreamSnapshot,
        started_at_s: f64,
    ) -> FairnessResult<Self> {
        let mut state = Self::new(config, snapshot.stream, started_at_s);
        state.ledger = DebtLedger::from_state(state.thresholds.governance_threshold, snapshot.debt)?;
        state.audit = AuditLog::from_entries(snapshot.audit)?;
        state.mttfr = MttfrTracker::replay(started_at_s, state.audit.complete_timestamps());
        state.last_di = snapshot.last_di;
        state.last_timestamp_s = snapshot.last_timestamp_s;
        Ok(state)
    }

    /// One atomic monitoring-and-correction cycle on this stream's
    /// share of a batch. An `Err` leaves the stream untouched.
    fn cycle(
        &mut self,
        monitor: &FairnessMonitor,
        batch_id: &str,
        timestamp_s: f64,
        records: &[ScoredRecord],
        predictions: &mut [Option<u8>],
        warnings: &mut Vec<MonitorWarning>,
    ) -> FairnessResult<StreamOutcome> {
        let assessment = monitor.assess(&self.key, records);
        let mut outcome = StreamOutcome {
            stream: self.key.clone(),
            di: assessment.di,
            reported_di: None,
            risk: assessment.risk,
            delta_debt: assessment.delta_debt,
            debt: self.ledger.debt(),
            governance_threshold: self.thresholds.governance_threshold,
            intervened: false,
            audit_entry: None,
        };

        match assessment.di {
            None => {
                let reason = assessment
                    .undefined_reason
                    .unwrap_or_else(|| "disparate impact undefined".to_string());
                log::warn!(
                    "Stream {}: batch {batch_id} DI undefined ({reason}); debt accumulation skipped",
                    self.key
                );
                warnings.push(MonitorWarning::UndefinedDisparateImpact {
                    stream: self.key.clone(),
                    reason,
                });
            }
            Some(di) => {
                let debt = self.ledger.accumulate(assessment.delta_debt)?;
                self.last_di = Some(di);
                log::debug!(
                    "Stream {}: batch {batch_id} DI {di:.4} risk {:.4} ΔD {:.4} → D {debt:.4} (Γ {})",
                    self.key,
                    assessment.risk,
                    assessment.delta_debt,
                    self.thresholds.governance_threshold
                );

                if self.ledger.exceeds_threshold() {
                    let attempt = self.correct(
                        monitor,
                        di,
                        batch_id,
                        timestamp_s,
                        records,
                        predictions,
                        warnings,
                    );
                    if let Some(entry) = attempt {
                        outcome.di = Some(entry.di_after);
                        outcome.intervened = true;
                        outcome.audit_entry = Some(entry);
                    }
                }
            }
        }

        outcome.reported_di = self.last_di;
        outcome.debt = self.ledger.debt();
        self.last_timestamp_s = Some(timestamp_s);
        Ok(outcome)
    }

    /// Correcting phase. Returns the audit entry when an attempt was made.
    #[allow(clippy::too_many_arguments)]
    fn correct(
        &mut self,
        monitor: &FairnessMonitor,
        di: f64,
        batch_id: &str,
        timestamp_s: f64,
        records: &[ScoredRecord],
        predictions: &mut [Option<u8>],
        warnings: &mut Vec<MonitorWarning>,
    ) -> Option<InterventionEvent> {
        let mut infeasible = None;
        let result = match self.corrector.correct(monitor.metric(), records) {
            Ok(Correction::Applied(result)) => result,
            Ok(Correction::AlreadyFair { di }) => {
                log::debug!(
                    "Stream {}: debt {:.4} >= Γ but batch {batch_id} already fair (DI {di:.4}); no flips",
                    self.key,
                    self.ledger.debt()
                );
                return None;
            }
            Err(e) => {
                let eligible = DirectBiasCorrector::rank_candidates(records).len();
                infeasible = Some(format!("correction could not rescore the batch: {e}"));
                CorrectionResult::unmeasured(di, eligible, self.corrector.flip_cap(eligible))
            }
        };

        DirectBiasCorrector::apply(&result, predictions);
        let debt_before = self.ledger.debt();
        let debt_after = match result.outcome {
            CorrectionOutcome::Complete => {
                self.ledger.reset(timestamp_s);
                let interval = self.mttfr.record(timestamp_s);
                log::info!(
                    "Stream {}: complete correction on batch {batch_id}: {} flips, DI {:.4} → {:.4}, debt {debt_before:.4} reset (interval {interval:.3}s)",
                    self.key,
                    result.flips.len(),
                    result.di_before,
                    result.di_after
                );
                0.0
            }
            CorrectionOutcome::Partial => {
                let reason = infeasible.unwrap_or_else(|| partial_reason(&result));
                log::warn!(
                    "Stream {}: partial correction on batch {batch_id}: {reason}; debt {debt_before:.4} stays elevated",
                    self.key
                );
                warnings.push(MonitorWarning::CorrectionInfeasible {
                    stream: self.key.clone(),
                    reason,
                });
                debt_before
            }
        };

        let entry = self.audit.append(InterventionEvent {
            sequence: 0,
            stream: self.key.clone(),
            timestamp_s,
            batch_id: batch_id.to_string(),
            outcome: result.outcome,
            di_before: result.di_before,
            di_after: result.di_after,
            debt_before,
            debt_after,
            eligible_candidates: result.eligible,
            flip_cap: result.cap,
            flipped_indices: result.flipped_indices(),
            boundary_distances: result.boundary_distances(),
        });
        self.last_di = Some(result.di_after);
        Some(entry.clone())
    }

    fn report(&self, now_s: f64) -> StreamReport {
        StreamReport {
            stream: self.key.clone(),
            debt: self.ledger.debt(),
            governance_threshold: self.ledger.governance_threshold(),
            correction_strength: self.thresholds.correction_strength,
            last_di: self.last_di,
            complete_corrections: self.mttfr.complete_corrections() as usize,
            partial_corrections: self.audit.partial_count(),
            mttfr_s: self.mttfr.mttfr(),
            age_s: self.mttfr.current_age(now_s),
            age_ratio: self.mttfr.age_ratio(now_s),
        }
    }

    fn snapshot(&self) -> StreamSnapshot {
        StreamSnapshot {
            stream: self.key.clone(),
            debt: self.ledger.state().clone(),
            audit: self.audit.entries().to_vec(),
            last_di: self.last_di,
            last_timestamp_s: self.last_timestamp_s,
        }
    }
}

fn partial_reason(result: &CorrectionResult) -> String {
    if result.eligible == 0 {
        "no eligible candidates".to_string()
    } else if result.cap == 0 {
        format!("flip cap is 0 for {} eligible candidates", result.eligible)
    } else {
        format!(
            "cap of {} flips ({} eligible) reached at DI {:.4}",
            result.cap, result.eligible, result.di_after
        )
    }
}

/// Temporal fairness governor for one monitoring session.
///
/// Thread-safe: streams are guarded by `parking_lot::Mutex`, the stream
/// table by a `parking_lot::RwLock`.
pub struct FairnessGovernor {
    monitor: FairnessMonitor,
    clock: Arc<dyn Clock>,
    started_at_s: f64,
    sink: Option<Arc<dyn AuditSink>>,
    streams: RwLock<BTreeMap<StreamKey, SharedStream>>,
    protected_observed: AtomicBool,
    disadvantaged_observed: AtomicBool,
}

impl FairnessGovernor {
    /// Governor with the built-in metric and a monotonic clock.
    pub fn new(config: MonitorConfig) -> FairnessResult<Self> {
        Self::with_clock(config, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(config: MonitorConfig, clock: Arc<dyn Clock>) -> FairnessResult<Self> {
        Ok(Self::from_monitor(FairnessMonitor::new(config)?, clock))
    }

    pub fn with_metric(
        config: MonitorConfig,
        metric: Arc<dyn FairnessMetric>,
        clock: Arc<dyn Clock>,
    ) -> FairnessResult<Self> {
        Ok(Self::from_monitor(
            FairnessMonitor::with_metric(config, metric)?,
            clock,
        ))
    }

    fn from_monitor(monitor: FairnessMonitor, clock: Arc<dyn Clock>) -> Self {
        let started_at_s = clock.now_s();
        let mut streams = BTreeMap::new();
        if monitor.config().intersectional_attributes.is_empty() {
            let key = StreamKey::overall();
            let state = StreamState::new(monitor.config(), key.clone(), started_at_s);
            streams.insert(key, Arc::new(Mutex::new(state)));
        }
        Self {
            monitor,
            clock,
            started_at_s,
            sink: None,
            streams: RwLock::new(streams),
            protected_observed: AtomicBool::new(false),
            disadvantaged_observed: AtomicBool::new(false),
        }
    }

    /// Resume a session from a snapshot. `clock` must continue the
    /// snapshot's session time frame.
    pub fn restore(
        config: MonitorConfig,
        snapshot: GovernorSnapshot,
        clock: Arc<dyn Clock>,
    ) -> FairnessResult<Self> {
        let monitor = FairnessMonitor::new(config)?;
        let mut streams = BTreeMap::new();
        for stream in snapshot.streams {
            let state = StreamState::restore(monitor.config(), stream, snapshot.started_at_s)?;
            streams.insert(state.key.clone(), Arc::new(Mutex::new(state)));
        }
        if monitor.config().intersectional_attributes.is_empty() {
            streams.entry(StreamKey::overall()).or_insert_with(|| {
                Arc::new(Mutex::new(StreamState::new(
                    monitor.config(),
                    StreamKey::overall(),
                    snapshot.started_at_s,
                )))
            });
        }
        log::info!(
            "Restored fairness governor with {} stream(s) from snapshot taken at {:.3}s",
            streams.len(),
            snapshot.taken_at_s
        );
        Ok(Self {
            monitor,
            clock,
            started_at_s: snapshot.started_at_s,
            sink: None,
            streams: RwLock::new(streams),
            protected_observed: AtomicBool::new(snapshot.protected_observed),
            disadvantaged_observed: AtomicBool::new(snapshot.disadvantaged_observed),
        })
    }

    /// Forward every new audit entry, on every stream, to `sink`.
    ///
    /// Entries are forwarded once the batch's stream locks are released;
    /// across concurrent batches they may arrive out of `sequence` order.
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Process one batch: the per-batch call.
    ///
    /// A batch without `observed_at_s` is stamped from the clock once its
    /// streams are locked, never earlier than their last batch. An
    /// explicit `observed_at_s` earlier than a stream's last batch is
    /// rejected with `OutOfOrder`.
    ///
    /// Returns `Err` only for configuration errors on first use,
    /// non-finite or out-of-order timestamps, and batches with no valid
    /// records. Everything else degrades to warnings in the outcome.
    pub fn process_batch(&self, batch: &Batch) -> FairnessResult<BatchOutcome> {
        if let Some(t) = batch.observed_at_s {
            if !t.is_finite() {
                return Err(FairnessError::Validation(format!(
                    "batch {} timestamp {t} is not finite",
                    batch.batch_id
                )));
            }
        }

        let partition = self.monitor.partition(batch);
        let mut warnings = Vec::new();
        for rejected in &partition.rejected {
            if let FairnessError::MalformedRecord { index, reason } = rejected {
                log::warn!("Batch {}: record #{index} rejected: {reason}", batch.batch_id);
                warnings.push(MonitorWarning::RecordRejected {
                    index: *index,
                    reason: reason.clone(),
                });
            }
        }

        self.check_observed(&partition)?;
        if partition.streams.is_empty() {
            return Err(FairnessError::Validation(format!(
                "batch {} has no valid records",
                batch.batch_id
            )));
        }

        let handles = self.acquire_streams(&partition);
        let mut guards: Vec<_> = handles.iter().map(|h| h.lock()).collect();

        let last_s = guards
            .iter()
            .filter_map(|g| g.last_timestamp_s)
            .reduce(f64::max);
        let timestamp_s = match (batch.observed_at_s, last_s) {
            (Some(got_s), Some(last_s)) if got_s < last_s => {
                return Err(FairnessError::OutOfOrder { last_s, got_s });
            }
            (Some(got_s), _) => got_s,
            (None, last_s) => {
                let now_s = self.clock.now_s();
                last_s.map_or(now_s, |l| now_s.max(l))
            }
        };

        let mut predictions: Vec<Option<u8>> = vec![None; batch.records.len()];
        for record in partition.streams.values().flatten() {
            predictions[record.index] = Some(record.prediction);
        }

        let mut streams = Vec::with_capacity(guards.len());
        for (guard, records) in guards.iter_mut().zip(partition.streams.values()) {
            match guard.cycle(
                &self.monitor,
                &batch.batch_id,
                timestamp_s,
                records,
                &mut predictions,
                &mut warnings,
            ) {
                Ok(outcome) => streams.push(outcome),
                Err(e) => {
                    log::error!(
                        "Stream {}: cycle failed for batch {}: {e}",
                        guard.key,
                        batch.batch_id
                    );
                    warnings.push(MonitorWarning::StreamSkipped {
                        stream: guard.key.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        drop(guards);

        if let Some(sink) = &self.sink {
            audit::forward(
                sink.as_ref(),
                streams.iter().filter_map(|s| s.audit_entry.as_ref()),
            );
        }

        Ok(BatchOutcome {
            batch_id: batch.batch_id.clone(),
            timestamp_s,
            corrected_predictions: predictions,
            streams,
            warnings,
        })
    }

    fn check_observed(&self, partition: &Partition) -> FairnessResult<()> {
        if partition.protected_observed {
            self.protected_observed.store(true, Ordering::SeqCst);
        }
        if partition.disadvantaged_observed {
            self.disadvantaged_observed.store(true, Ordering::SeqCst);
        }
        let config = self.monitor.config();
        if !self.protected_observed.load(Ordering::SeqCst) {
            return Err(FairnessError::Configuration(format!(
                "protected attribute '{}' not observed in any batch",
                config.protected_attribute
            )));
        }
        if !self.disadvantaged_observed.load(Ordering::SeqCst) {
            return Err(FairnessError::Configuration(format!(
                "disadvantaged group '{}' of '{}' not observed in any batch",
                config.disadvantaged_group, config.protected_attribute
            )));
        }
        Ok(())
    }

    /// Stream handles for the partition, in key order, creating streams
    /// seen for the first time.
    fn acquire_streams(&self, partition: &Partition) -> Vec<SharedStream> {
        {
            let streams = self.streams.read();
            let found: Vec<SharedStream> = partition
                .streams
                .keys()
                .filter_map(|k| streams.get(k).cloned())
                .collect();
            if found.len() == partition.streams.len() {
                return found;
            }
        }

        let mut streams = self.streams.write();
        partition
            .streams
            .keys()
            .map(|key| {
                streams
                    .entry(key.clone())
                    .or_insert_with(|| {
                        log::info!("Tracking new fairness stream {key}");
                        Arc::new(Mutex::new(StreamState::new(
                            self.monitor.config(),
                            key.clone(),
                            self.started_at_s,
                        )))
                    })
                    .clone()
            })
            .collect()
    }

    fn stream(&self, key: &StreamKey) -> Option<SharedStream> {
        self.streams.read().get(key).cloned()
    }

    pub fn config(&self) -> &MonitorConfig {
        self.monitor.config()
    }

    pub fn started_at_s(&self) -> f64 {
        self.started_at_s
    }

    pub fn stream_keys(&self) -> Vec<StreamKey> {
        self.streams.read().keys().cloned().collect()
    }

    /// Current debt of a stream.
    pub fn debt(&self, key: &StreamKey) -> Option<f64> {
        self.stream(key).map(|s| s.lock().ledger.debt())
    }

    pub fn debt_state(&self, key: &StreamKey) -> Option<DebtState> {
        self.stream(key).map(|s| s.lock().ledger.state().clone())
    }

    pub fn exceeds_threshold(&self, key: &StreamKey) -> bool {
        self.stream(key)
            .map(|s| s.lock().ledger.exceeds_threshold())
            .unwrap_or(false)
    }

    /// MTTFR of a stream; `None` before its first complete correction.
    pub fn mttfr(&self, key: &StreamKey) -> Option<f64> {
        self.stream(key).and_then(|s| s.lock().mttfr.mttfr())
    }

    /// Last defined DI of a stream.
    pub fn last_di(&self, key: &StreamKey) -> Option<f64> {
        self.stream(key).and_then(|s| s.lock().last_di)
    }

    pub fn audit_log(&self, key: &StreamKey) -> Vec<InterventionEvent> {
        self.stream(key)
            .map(|s| s.lock().audit.entries().to_vec())
            .unwrap_or_default()
    }

    /// Audit entries of all streams, ordered by time, stream, sequence.
    pub fn audit_entries(&self) -> Vec<InterventionEvent> {
        let handles: Vec<SharedStream> = self.streams.read().values().cloned().collect();
        let mut entries: Vec<InterventionEvent> = handles
            .iter()
            .flat_map(|h| h.lock().audit.entries().to_vec())
            .collect();
        entries.sort_by(|a, b| {
            a.timestamp_s
                .total_cmp(&b.timestamp_s)
                .then_with(|| a.stream.cmp(&b.stream))
                .then_with(|| a.sequence.cmp(&b.sequence))
        });
        entries
    }

    pub fn report(&self) -> GovernanceReport {
        let now_s = self.clock.now_s();
        let handles: Vec<SharedStream> = self.streams.read().values().cloned().collect();
        GovernanceReport {
            generated_at_s: now_s,
            streams: handles.iter().map(|h| h.lock().report(now_s)).collect(),
        }
    }

    pub fn snapshot(&self) -> GovernorSnapshot {
        let handles: Vec<SharedStream> = self.streams.read().values().cloned().collect();
        GovernorSnapshot {
            started_at_s: self.started_at_s,
            taken_at_s: self.clock.now_s(),
            protected_observed: self.protected_observed.load(Ordering::SeqCst),
            disadvantaged_observed: self.disadvantaged_observed.load(Ordering::SeqCst),
            streams: handles.iter().map(|h| h.lock().snapshot()).collect(),
        }
    }
}
