// ─────────────────────────────────────────────────────────────────────
// Fairness Debt Governor — Intervention Audit Log
// ─────────────────────────────────────────────────────────────────────
//! Append-only record of every correction attempt, and sinks forwarding
//! committed entries to an external store.
//!
//! Sinks are called after the owning stream's lock is released, so a
//! sink may call back into the governor.

use parking_lot::Mutex;

use fairdebt_types::{FairnessError, FairnessResult, InterventionEvent};

/// Trait for external audit stores.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &InterventionEvent) -> FairnessResult<()>;
}

/// In-memory sink collecting every forwarded entry.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<InterventionEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<InterventionEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl AuditSink for MemorySink {
    fn record(&self, event: &InterventionEvent) -> FairnessResult<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// External sink that calls a function pointer.
///
/// Used by the FFI layer to hand entries to a host-language store.
type RecordFn = Box<dyn Fn(&InterventionEvent) -> FairnessResult<()> + Send + Sync>;

pub struct ExternalSink {
    record_fn: RecordFn,
}

impl ExternalSink {
    pub fn new(
        record_fn: impl Fn(&InterventionEvent) -> FairnessResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            record_fn: Box::new(record_fn),
        }
    }
}

impl AuditSink for ExternalSink {
    fn record(&self, event: &InterventionEvent) -> FairnessResult<()> {
        (self.record_fn)(event)
    }
}

/// Hand committed entries to `sink`. Failures are logged, never fatal.
pub fn forward<'a>(sink: &dyn AuditSink, entries: impl IntoIterator<Item = &'a InterventionEvent>) {
    for event in entries {
        if let Err(e) = sink.record(event) {
            log::error!(
                "Audit sink rejected entry #{} for stream {}: {e}",
                event.sequence,
                event.stream
            );
        }
    }
}

/// Append-only intervention history for one stream.
#[derive(Debug, Default)]
pub struct AuditLog {
    entries: Vec<InterventionEvent>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from persisted entries. Sequences must run 0, 1, 2, ...
    /// and timestamps must not decrease.
    pub fn from_entries(entries: Vec<InterventionEvent>) -> FairnessResult<Self> {
        for (i, e) in entries.iter().enumerate() {
            if e.sequence != i as u64 {
                return Err(FairnessError::Validation(format!(
                    "audit entry {i} carries sequence {}",
                    e.sequence
                )));
            }
            if i > 0 && e.timestamp_s < entries[i - 1].timestamp_s {
                return Err(FairnessError::Validation(format!(
                    "audit entry {i} precedes its predecessor"
                )));
            }
        }
        Ok(Self { entries })
    }

    /// Append an entry, assigning its sequence number.
    pub fn append(&mut self, mut event: InterventionEvent) -> &InterventionEvent {
        event.sequence = self.entries.len() as u64;
        self.entries.push(event);
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[InterventionEvent] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Timestamps of complete corrections, in order.
    pub fn complete_timestamps(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries
            .iter()
            .filter(|e| e.is_complete())
            .map(|e| e.timestamp_s)
    }

    pub fn complete_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_complete()).count()
    }

    pub fn partial_count(&self) -> usize {
        self.entries.len() - self.complete_count()
    }

    /// One JSON object per line, in append order.
    pub fn to_jsonl(&self) -> FairnessResult<String> {
        let mut out = String::new();
        for e in &self.entries {
            out.push_str(&serde_json::to_string(e)?);
            out.push('\n');
        }
        Ok(out)
    }
}
