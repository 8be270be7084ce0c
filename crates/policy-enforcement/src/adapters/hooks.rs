//! Hook implementations

use async_trait::async_trait;
use twin_types::Signal;

use crate::domain::EnforcementConfig;
use crate::error::StageResult;
use crate::ports::EnforcementHooks;

/// All hooks are identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl EnforcementHooks for DefaultHooks {}

/// Adds configured header fields to authorized signals.
///
/// Fields the signal already carries are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ExtraFieldsEnricher {
    fields: Vec<(String, String)>,
}

impl ExtraFieldsEnricher {
    pub fn new(fields: Vec<(String, String)>) -> Self {
        Self { fields }
    }

    pub fn from_config(config: &EnforcementConfig) -> Self {
        Self::new(config.extra_header_fields.clone())
    }
}

#[async_trait]
impl EnforcementHooks for ExtraFieldsEnricher {
    async fn enrich_signal(&self, signal: Signal) -> StageResult<Signal> {
        let missing: Vec<_> = self
            .fields
            .iter()
            .filter(|(key, _)| !signal.headers().contains_key(key))
            .collect();
        if missing.is_empty() {
            return Ok(signal);
        }

        let mut headers = signal.headers().clone();
        for (key, value) in missing {
            headers.insert(key, value.clone());
        }
        Ok(signal.with_headers(headers))
    }
}
