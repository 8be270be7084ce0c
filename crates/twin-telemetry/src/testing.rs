//! Recording tracer for tests.
//!
//! Every span started through a `RecordingTracer` is captured as a
//! `SpanRecord`, so tests can assert which marks a pipeline set, whether it
//! tagged a failure and whether it finished the span.
//! Available with the `test-utils` feature flag.

use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use twin_types::DittoHeaders;

use crate::span::{Tracer, TracingSpan};

/// What happened to one span.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpanRecord {
    pub operation: String,
    pub correlation_id: Option<String>,
    pub marks: Vec<&'static str>,
    pub failure: Option<String>,
    pub finished: bool,
    /// Trace-parent this span writes into propagated headers.
    pub trace_parent: String,
}

/// Tracer capturing spans in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingTracer {
    records: Arc<Mutex<Vec<SpanRecord>>>,
    next_id: Arc<AtomicU64>,
}

impl RecordingTracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all spans started so far, in start order.
    pub fn spans(&self) -> Vec<SpanRecord> {
        self.records.lock().clone()
    }

    /// The only span started so far.
    ///
    /// # Panics
    ///
    /// Panics unless exactly one span was started.
    pub fn single_span(&self) -> SpanRecord {
        let spans = self.spans();
        assert_eq!(spans.len(), 1, "expected exactly one span, got {spans:?}");
        spans[0].clone()
    }
}

impl Tracer for RecordingTracer {
    fn start_span(&self, operation: &'static str, headers: &DittoHeaders) -> Box<dyn TracingSpan> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let record = SpanRecord {
            operation: operation.to_string(),
            correlation_id: headers.correlation_id().map(String::from),
            trace_parent: format!("00-{id:032x}-{id:016x}-01"),
            ..SpanRecord::default()
        };
        let index = {
            let mut records = self.records.lock();
            records.push(record);
            records.len() - 1
        };
        Box::new(RecordingSpan {
            operation,
            index,
            records: self.records.clone(),
        })
    }
}

struct RecordingSpan {
    operation: &'static str,
    index: usize,
    records: Arc<Mutex<Vec<SpanRecord>>>,
}

impl RecordingSpan {
    fn update(&self, f: impl FnOnce(&mut SpanRecord)) {
        if let Some(record) = self.records.lock().get_mut(self.index) {
            f(record);
        }
    }
}

impl TracingSpan for RecordingSpan {
    fn operation(&self) -> &str {
        self.operation
    }

    fn mark(&mut self, name: &'static str) {
        self.update(|record| record.marks.push(name));
    }

    fn propagate_context(&self, headers: DittoHeaders) -> DittoHeaders {
        let trace_parent = self
            .records
            .lock()
            .get(self.index)
            .map(|record| record.trace_parent.clone())
            .unwrap_or_default();
        headers.with_trace_parent(trace_parent)
    }

    fn tag_as_failed(&mut self, error: &(dyn Error + 'static)) {
        let message = error.to_string();
        self.update(|record| record.failure = Some(message));
    }

    fn finish(self: Box<Self>) {
        self.update(|record| record.finished = true);
    }
}
