//! Pre-enforcers run before policy resolution

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use twin_types::{EnforcementError, Signal};
use uuid::Uuid;

use crate::domain::EnforcementConfig;
use crate::error::StageResult;
use crate::ports::PreEnforcer;

/// Passes every signal through.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpPreEnforcer;

#[async_trait]
impl PreEnforcer for NoOpPreEnforcer {
    async fn pre_enforce(&self, signal: Signal) -> StageResult<Signal> {
        Ok(signal)
    }
}

/// Runs pre-enforcers in order; the first failure short-circuits.
#[derive(Clone, Default)]
pub struct PreEnforcerChain {
    stages: Vec<Arc<dyn PreEnforcer>>,
}

impl PreEnforcerChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pre-enforcer.
    pub fn then(mut self, stage: impl PreEnforcer + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Chain of the built-in pre-enforcers for `config`.
    pub fn from_config(config: &EnforcementConfig) -> Self {
        let chain = Self::new().then(CorrelationIdPreEnforcer);
        if config.blocked_namespaces.is_empty() {
            chain
        } else {
            chain.then(BlockedNamespacesPreEnforcer::new(
                config.blocked_namespaces.iter().cloned(),
            ))
        }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

#[async_trait]
impl PreEnforcer for PreEnforcerChain {
    async fn pre_enforce(&self, signal: Signal) -> StageResult<Signal> {
        let mut signal = signal;
        for stage in &self.stages {
            signal = stage.pre_enforce(signal).await?;
        }
        Ok(signal)
    }
}

/// Assigns a random correlation id to signals that lack one.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationIdPreEnforcer;

#[async_trait]
impl PreEnforcer for CorrelationIdPreEnforcer {
    async fn pre_enforce(&self, signal: Signal) -> StageResult<Signal> {
        if signal.headers().correlation_id().is_some() {
            return Ok(signal);
        }
        let correlation_id = Uuid::new_v4().to_string();
        debug!(%correlation_id, entity_id = %signal.entity_id(), "Assigned correlation id");
        let headers = signal.headers().clone().with_correlation_id(correlation_id);
        Ok(signal.with_headers(headers))
    }
}

/// Refuses signals addressed to blocked namespaces.
#[derive(Debug, Clone, Default)]
pub struct BlockedNamespacesPreEnforcer {
    namespaces: HashSet<String>,
}

impl BlockedNamespacesPreEnforcer {
    pub fn new(namespaces: impl IntoIterator<Item = String>) -> Self {
        Self {
            namespaces: namespaces.into_iter().collect(),
        }
    }

    pub fn is_blocked(&self, namespace: &str) -> bool {
        self.namespaces.contains(namespace)
    }
}

#[async_trait]
impl PreEnforcer for BlockedNamespacesPreEnforcer {
    async fn pre_enforce(&self, signal: Signal) -> StageResult<Signal> {
        let namespace = signal.entity_id().namespace();
        if self.is_blocked(namespace) {
            return Err(EnforcementError::NamespaceBlocked {
                namespace: namespace.to_string(),
                headers: signal.headers().clone(),
            }
            .into());
        }
        Ok(signal)
    }
}
