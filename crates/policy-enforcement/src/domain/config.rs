//! Enforcement configuration and validation
//!
//! # Example
//!
//! ```ignore
//! use policy_enforcement::EnforcementConfig;
//! use std::time::Duration;
//!
//! let config = EnforcementConfig::default()
//!     .with_enforcement_timeout(Duration::from_secs(10))
//!     .with_blocked_namespace("quarantine");
//! config.validate()?;
//! ```

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Settings for one enforcer and its collaborators.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnforcementConfig {
    /// Worker threads of the dedicated enforcement pool; `None` runs
    /// pipelines on the caller's runtime
    pub pool_size: Option<usize>,
    /// Messages buffered in the enforcer mailbox
    pub mailbox_capacity: usize,
    /// Upper bound for one pipeline run; `None` means unbounded
    pub enforcement_timeout: Option<Duration>,
    /// Policy enforcers kept by the caching provider
    pub enforcer_cache_capacity: usize,
    /// How long a cached policy enforcer (or its absence) stays valid
    pub enforcer_cache_ttl: Duration,
    /// Namespaces whose signals are refused before authorization
    pub blocked_namespaces: Vec<String>,
    /// Header fields added to authorized signals when not already present
    pub extra_header_fields: Vec<(String, String)>,
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self {
            pool_size: Some(num_cpus::get()),
            mailbox_capacity: 1024,
            enforcement_timeout: None,
            enforcer_cache_capacity: 10_000,
            enforcer_cache_ttl: Duration::from_secs(300),
            blocked_namespaces: Vec::new(),
            extra_header_fields: Vec::new(),
        }
    }
}

impl EnforcementConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `TWIN_ENFORCEMENT_POOL_SIZE`: dedicated pool workers, `0` shares the
    ///   caller's runtime (default: CPU count)
    /// - `TWIN_ENFORCEMENT_MAILBOX_CAPACITY`: mailbox size (default: 1024)
    /// - `TWIN_ENFORCEMENT_TIMEOUT_MS`: pipeline bound in ms (default: unset, unbounded)
    /// - `TWIN_ENFORCER_CACHE_CAPACITY`: cached enforcers (default: 10000)
    /// - `TWIN_ENFORCER_CACHE_TTL_SECS`: cache entry lifetime (default: 300)
    /// - `TWIN_BLOCKED_NAMESPACES`: comma separated namespaces (default: none)
    /// - `TWIN_ENRICHMENT_EXTRA_FIELDS`: `key=value,...` (default: none)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            pool_size: match parse_var::<usize>("TWIN_ENFORCEMENT_POOL_SIZE")? {
                Some(0) => None,
                Some(size) => Some(size),
                None => defaults.pool_size,
            },
            mailbox_capacity: parse_var("TWIN_ENFORCEMENT_MAILBOX_CAPACITY")?
                .unwrap_or(defaults.mailbox_capacity),
            enforcement_timeout: parse_var::<u64>("TWIN_ENFORCEMENT_TIMEOUT_MS")?
                .map(Duration::from_millis),
            enforcer_cache_capacity: parse_var("TWIN_ENFORCER_CACHE_CAPACITY")?
                .unwrap_or(defaults.enforcer_cache_capacity),
            enforcer_cache_ttl: parse_var::<u64>("TWIN_ENFORCER_CACHE_TTL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.enforcer_cache_ttl),
            blocked_namespaces: env::var("TWIN_BLOCKED_NAMESPACES")
                .map(|raw| parse_list(&raw))
                .unwrap_or_default(),
            extra_header_fields: match env::var("TWIN_ENRICHMENT_EXTRA_FIELDS") {
                Ok(raw) => parse_header_fields(&raw)?,
                Err(_) => Vec::new(),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == Some(0) {
            return Err(ConfigError::Zero { field: "pool_size" });
        }
        if self.mailbox_capacity == 0 {
            return Err(ConfigError::Zero {
                field: "mailbox_capacity",
            });
        }
        if self.enforcement_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::Zero {
                field: "enforcement_timeout",
            });
        }
        if self.enforcer_cache_capacity == 0 {
            return Err(ConfigError::Zero {
                field: "enforcer_cache_capacity",
            });
        }
        if let Some((key, _)) = self
            .extra_header_fields
            .iter()
            .find(|(key, _)| key.trim().is_empty())
        {
            return Err(ConfigError::InvalidHeaderField(format!("empty key '{key}'")));
        }
        Ok(())
    }

    /// Run pipelines on the caller's runtime instead of a dedicated pool
    pub fn on_current_runtime(mut self) -> Self {
        self.pool_size = None;
        self
    }

    pub fn with_enforcement_timeout(mut self, timeout: Duration) -> Self {
        self.enforcement_timeout = Some(timeout);
        self
    }

    pub fn with_blocked_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.blocked_namespaces.push(namespace.into());
        self
    }

    pub fn with_extra_header_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_header_fields.push((key.into(), value.into()));
        self
    }
}

fn parse_var<T>(variable: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(variable) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidVariable {
                variable,
                value: raw.clone(),
                reason: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

/// Parse `key=value,key2=value2`.
pub(crate) fn parse_header_fields(raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
    parse_list(raw)
        .into_iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.trim().to_string()))
            }
            _ => Err(ConfigError::InvalidHeaderField(pair)),
        })
        .collect()
}
