//! Prometheus metrics for the enforcement pipelines.
//!
//! Names are prefixed `twin_`. Pipeline counters are labelled by outcome,
//! the duration histogram by pipeline (see [`pipeline`]).

use lazy_static::lazy_static;
use prometheus::core::Collector;
use prometheus::{
    exponential_buckets, Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Instant;

use crate::TelemetryError;

/// Label values for `pipeline`.
pub mod pipeline {
    pub const AUTHORIZATION: &str = "authorization";
    pub const FILTERING: &str = "filtering";
}

lazy_static! {
    /// Registry every enforcement metric is registered with.
    pub static ref REGISTRY: Registry = Registry::new();

    /// Signals run through the authorization pipeline
    pub static ref SIGNALS_ENFORCED: IntCounterVec = IntCounterVec::new(
        Opts::new("twin_enforcement_signals_total", "Signals run through policy enforcement"),
        &["outcome"]  // outcome: success/failure
    ).expect("metric creation failed");

    /// Responses run through the filtering pipeline
    pub static ref RESPONSES_FILTERED: IntCounterVec = IntCounterVec::new(
        Opts::new("twin_enforcement_responses_total", "Command responses run through filtering"),
        &["outcome"]  // outcome: filtered/bypassed/failure
    ).expect("metric creation failed");

    pub static ref ENFORCEMENT_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "twin_enforcement_duration_seconds",
            "Time from pipeline start until its outcome is delivered"
        ).buckets(exponential_buckets(0.0001, 2.0, 16).expect("valid buckets")),
        &["pipeline"]
    ).expect("metric creation failed");

    pub static ref ENFORCEMENTS_IN_FLIGHT: IntGauge = IntGauge::new(
        "twin_enforcement_in_flight",
        "Pipelines started but not yet delivered"
    ).expect("metric creation failed");

    /// Messages the enforcer did not act on
    pub static ref MESSAGES_DROPPED: IntCounterVec = IntCounterVec::new(
        Opts::new("twin_enforcement_messages_dropped_total", "Messages dropped by the enforcer"),
        &["reason"]  // reason: unhandled/mailbox_closed/receiver_gone
    ).expect("metric creation failed");

    pub static ref ENFORCER_CACHE: IntCounterVec = IntCounterVec::new(
        Opts::new("twin_enforcer_cache_total", "Policy enforcer cache lookups"),
        &["result"]  // result: hit/miss/expired
    ).expect("metric creation failed");
}

/// Keeps the registry alive for as long as telemetry is initialized.
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

fn collectors() -> [Box<dyn Collector>; 6] {
    [
        Box::new(SIGNALS_ENFORCED.clone()),
        Box::new(RESPONSES_FILTERED.clone()),
        Box::new(ENFORCEMENT_DURATION.clone()),
        Box::new(ENFORCEMENTS_IN_FLIGHT.clone()),
        Box::new(MESSAGES_DROPPED.clone()),
        Box::new(ENFORCER_CACHE.clone()),
    ]
}

/// Register the enforcement metrics with [`REGISTRY`]. Idempotent.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    collectors()
        .into_iter()
        .map(|collector| REGISTRY.register(collector))
        .filter(|registered| !matches!(registered, Err(prometheus::Error::AlreadyReg)))
        .collect::<Result<(), _>>()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Scrape output for [`REGISTRY`].
pub fn encode_metrics() -> Result<String, TelemetryError> {
    TextEncoder::new()
        .encode_to_string(&REGISTRY.gather())
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Observes the lifetime of one pipeline run into `twin_enforcement_duration_seconds`.
pub struct HistogramTimer {
    histogram: Histogram,
    started: Instant,
}

impl HistogramTimer {
    pub fn pipeline(label: &str) -> Self {
        Self {
            histogram: ENFORCEMENT_DURATION.with_label_values(&[label]),
            started: Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        self.histogram.observe(self.started.elapsed().as_secs_f64());
    }
}

/// Keeps `twin_enforcement_in_flight` raised while alive.
pub struct InFlightGuard(());

impl InFlightGuard {
    pub fn enter() -> Self {
        ENFORCEMENTS_IN_FLIGHT.inc();
        Self(())
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        ENFORCEMENTS_IN_FLIGHT.dec();
    }
}
