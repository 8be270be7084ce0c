//! Logging and trace export settings.

use std::env;
use std::str::FromStr;

use crate::TelemetryError;

const DEFAULT_SERVICE_NAME: &str = "twin-enforcement";

/// How log lines are written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable, with colors.
    Pretty,
    /// One JSON object per line.
    Json,
    /// No console output; spans may still be exported.
    Off,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "off" | "none" => Ok(Self::Off),
            other => Err(TelemetryError::Config(format!(
                "TWIN_LOG_FORMAT must be pretty, json or off, got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Reported as `service.name` on exported spans.
    pub service_name: String,
    /// Export is disabled when `None`.
    pub otlp_endpoint: Option<String>,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    pub log_format: LogFormat,
    /// Reported as `deployment.environment`.
    pub environment: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            otlp_endpoint: None,
            log_filter: "info".to_string(),
            log_format: LogFormat::Pretty,
            environment: "dev".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Read the configuration from the environment.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `OTEL_SERVICE_NAME` | `twin-enforcement` |
    /// | `OTEL_EXPORTER_OTLP_ENDPOINT` | unset, no export |
    /// | `TWIN_LOG_LEVEL` | `info` |
    /// | `TWIN_LOG_FORMAT` | `pretty`, `json` inside a container |
    /// | `TWIN_ENVIRONMENT` | `dev` |
    pub fn from_env() -> Result<Self, TelemetryError> {
        let defaults = Self::default();
        let in_container =
            env::var_os("KUBERNETES_SERVICE_HOST").is_some() || env::var_os("DOCKER_CONTAINER").is_some();

        let log_format = match non_empty("TWIN_LOG_FORMAT") {
            Some(raw) => raw.parse()?,
            None if in_container => LogFormat::Json,
            None => defaults.log_format,
        };

        Ok(Self {
            service_name: non_empty("OTEL_SERVICE_NAME").unwrap_or(defaults.service_name),
            otlp_endpoint: non_empty("OTEL_EXPORTER_OTLP_ENDPOINT"),
            log_filter: non_empty("TWIN_LOG_LEVEL").unwrap_or(defaults.log_filter),
            log_format,
            environment: non_empty("TWIN_ENVIRONMENT").unwrap_or(defaults.environment),
        })
    }

    pub fn export_enabled(&self) -> bool {
        self.otlp_endpoint.is_some()
    }
}

fn non_empty(variable: &str) -> Option<String> {
    env::var(variable).ok().filter(|value| !value.trim().is_empty())
}
