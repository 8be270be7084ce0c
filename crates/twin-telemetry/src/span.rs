//! Started spans with named marks.
//!
//! A `TracingSpan` is an owned value: the pipeline that started it threads it
//! through its stages and finishes it exactly once. It is never shared
//! between tasks.

use std::error::Error;
use std::fmt;
use std::time::{Duration, Instant};

use opentelemetry::trace::{SpanContext, TraceContextExt, TraceFlags, TraceState};
use opentelemetry::Context;
use opentelemetry_sdk::trace::{IdGenerator, RandomIdGenerator};
use tracing::field;
use tracing_opentelemetry::OpenTelemetrySpanExt;
use twin_types::DittoHeaders;

use crate::context::{extract_span_context, inject_span_context};

/// Mark names recorded by the authorization pipeline.
pub mod marks {
    /// Operation name of the authorization span.
    pub const ENFORCE_POLICY: &str = "enforce_policy";
    pub const PRE_ENFORCED: &str = "pre_enforced";
    pub const ENFORCER_LOADED: &str = "enforcer_loaded";
    pub const ENFORCE_SUCCESS: &str = "enforce_success";
    pub const ENFORCE_FAILED: &str = "enforce_failed";
    pub const ENFORCE_ERROR: &str = "enforce_error";
}

/// A started span.
pub trait TracingSpan: Send {
    /// Operation this span was started for.
    fn operation(&self) -> &str;

    /// Record a named point in time.
    fn mark(&mut self, name: &'static str);

    /// Write this span's context into `headers` and return them.
    fn propagate_context(&self, headers: DittoHeaders) -> DittoHeaders;

    /// Tag the span with the failure that ended it.
    fn tag_as_failed(&mut self, error: &(dyn Error + 'static));

    /// End the span.
    fn finish(self: Box<Self>);
}

/// Factory for spans.
pub trait Tracer: Send + Sync {
    /// Start a span for `operation`, seeded with the correlation id found in
    /// `headers` and parented to the trace context found there, if any.
    fn start_span(&self, operation: &'static str, headers: &DittoHeaders) -> Box<dyn TracingSpan>;
}

/// Tracer backed by `tracing` spans.
///
/// With the OpenTelemetry layer installed (see `init_telemetry`) the span is
/// parented to the caller's context and the ids written into headers are the
/// exported span's own. Without the layer, ids are generated locally so
/// downstream work still joins the caller's trace.
#[derive(Debug, Default)]
pub struct DefaultTracer {
    id_generator: RandomIdGenerator,
}

impl DefaultTracer {
    pub fn new() -> Self {
        Self::default()
    }

    fn local_context(&self, parent: Option<&SpanContext>) -> SpanContext {
        SpanContext::new(
            parent
                .map(SpanContext::trace_id)
                .unwrap_or_else(|| self.id_generator.new_trace_id()),
            self.id_generator.new_span_id(),
            parent.map(SpanContext::trace_flags).unwrap_or(TraceFlags::SAMPLED),
            false,
            TraceState::default(),
        )
    }
}

impl Tracer for DefaultTracer {
    fn start_span(&self, operation: &'static str, headers: &DittoHeaders) -> Box<dyn TracingSpan> {
        let parent = extract_span_context(headers);

        let span = tracing::info_span!(
            "enforcement",
            otel.name = operation,
            operation = operation,
            correlation_id = field::Empty,
            trace_id = field::Empty,
            span_id = field::Empty,
            parent_span_id = field::Empty,
            otel.status_code = field::Empty,
            error = field::Empty,
        );
        if let Some(parent) = &parent {
            span.set_parent(Context::new().with_remote_span_context(parent.clone()));
            span.record("parent_span_id", field::display(parent.span_id()));
        }

        let exported = span.context().span().span_context().clone();
        let context = if exported.is_valid() {
            exported
        } else {
            self.local_context(parent.as_ref())
        };

        span.record("trace_id", field::display(context.trace_id()));
        span.record("span_id", field::display(context.span_id()));
        if let Some(correlation_id) = headers.correlation_id() {
            span.record("correlation_id", correlation_id);
        }

        Box::new(DefaultSpan {
            operation,
            span,
            context,
            started: Instant::now(),
            marks: Vec::new(),
        })
    }
}

struct DefaultSpan {
    operation: &'static str,
    span: tracing::Span,
    context: SpanContext,
    started: Instant,
    marks: Vec<(&'static str, Duration)>,
}

impl fmt::Debug for DefaultSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultSpan")
            .field("operation", &self.operation)
            .field("span_id", &self.context.span_id())
            .field("marks", &self.marks)
            .finish()
    }
}

impl TracingSpan for DefaultSpan {
    fn operation(&self) -> &str {
        self.operation
    }

    fn mark(&mut self, name: &'static str) {
        let elapsed = self.started.elapsed();
        self.marks.push((name, elapsed));
        tracing::debug!(
            parent: &self.span,
            mark = name,
            elapsed_us = elapsed.as_micros() as u64,
            "span mark"
        );
    }

    fn propagate_context(&self, headers: DittoHeaders) -> DittoHeaders {
        inject_span_context(&self.context, headers)
    }

    fn tag_as_failed(&mut self, error: &(dyn Error + 'static)) {
        self.span.record("otel.status_code", "ERROR");
        self.span.record("error", field::display(error));
    }

    fn finish(self: Box<Self>) {
        let marks: Vec<&str> = self.marks.iter().map(|(name, _)| *name).collect();
        tracing::debug!(
            parent: &self.span,
            duration_us = self.started.elapsed().as_micros() as u64,
            marks = ?marks,
            "span finished"
        );
    }
}
