//! Trace context propagation through header bags.
//!
//! When a signal crosses an asynchronous boundary its trace context travels
//! in the `traceparent` / `tracestate` headers (W3C Trace Context).
//!
//! ## How It Works
//!
//! 1. The enforcement span is started as a child of the caller's context
//!    (`extract_span_context`).
//! 2. The span's own context is written into a copy of the headers
//!    (`inject_span_context`) so downstream work joins the same trace.

use opentelemetry::propagation::{Extractor, Injector, TextMapPropagator};
use opentelemetry::trace::{SpanContext, TraceContextExt};
use opentelemetry::Context;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use twin_types::DittoHeaders;

struct HeaderInjector<'a>(&'a mut DittoHeaders);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        // the propagator always writes tracestate, even when it is empty
        if value.is_empty() {
            self.0.remove(key);
        } else {
            self.0.insert(key, value);
        }
    }
}

struct HeaderExtractor<'a>(&'a DittoHeaders);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key)
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().collect()
    }
}

/// Write `span_context` into `headers`, replacing any previous trace headers.
///
/// An invalid span context leaves the headers untouched.
pub fn inject_span_context(span_context: &SpanContext, headers: DittoHeaders) -> DittoHeaders {
    let mut headers = headers;
    let context = Context::new().with_remote_span_context(span_context.clone());
    TraceContextPropagator::new().inject_context(&context, &mut HeaderInjector(&mut headers));
    headers
}

/// Read the caller's span context from `headers`, if a valid one is present.
pub fn extract_span_context(headers: &DittoHeaders) -> Option<SpanContext> {
    let context = TraceContextPropagator::new().extract(&HeaderExtractor(headers));
    let span_context = context.span().span_context().clone();
    span_context.is_valid().then_some(span_context)
}
