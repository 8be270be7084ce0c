//! # Twin Telemetry
//!
//! Observability for the enforcement pipeline.
//!
//! ## Components
//!
//! - **Spans**: `Tracer` and `TracingSpan`: started spans with named marks,
//!   W3C context propagation into headers, failure tagging and finish.
//! - **Context**: `inject_span_context` / `extract_span_context` over
//!   `DittoHeaders` using the OpenTelemetry trace-context propagator.
//! - **Logging**: `tracing-subscriber` with env filter, pretty or JSON output
//!   and optional OTLP export.
//! - **Metrics**: Prometheus counters, gauges and histograms.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use twin_telemetry::{TelemetryConfig, init_telemetry};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = TelemetryConfig::from_env().expect("invalid telemetry config");
//!     let _guard = init_telemetry(config).await.expect("Failed to init telemetry");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | unset | OTLP endpoint, export disabled when unset |
//! | `OTEL_SERVICE_NAME` | `twin-enforcement` | Service name in traces |
//! | `TWIN_LOG_LEVEL` | `info` | Log level filter |
//! | `TWIN_LOG_FORMAT` | `pretty` (`json` in containers) | `pretty`, `json` or `off` |

mod config;
mod context;
pub mod metrics;
mod span;
mod tracing_setup;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use config::{LogFormat, TelemetryConfig};
pub use context::{extract_span_context, inject_span_context};
pub use metrics::{register_metrics, MetricsHandle};
pub use span::{marks, DefaultTracer, Tracer, TracingSpan};
pub use tracing_setup::TracingGuard;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize tracing: {0}")]
    TracerInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Register metrics, then install the subscriber described by `config`.
///
/// Keep the returned guard alive for as long as spans should be exported;
/// dropping it flushes pending spans.
pub async fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics = register_metrics()?;
    let tracing_guard = tracing_setup::init_tracing(&config)?;
    Ok(TelemetryGuard {
        exporting: config.export_enabled(),
        service_name: config.service_name,
        _metrics: metrics,
        _tracing: tracing_guard,
    })
}

pub struct TelemetryGuard {
    service_name: String,
    exporting: bool,
    _metrics: MetricsHandle,
    // dropped last: flushes the exporter
    _tracing: TracingGuard,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if self.exporting {
            tracing::info!(service = %self.service_name, "Flushing exported spans");
        }
    }
}
