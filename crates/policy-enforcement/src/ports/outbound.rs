//! Outbound Ports (Driven Ports)
//!
//! Collaborators each entity type plugs into the generic pipelines. They
//! fail with [`StageError`](crate::error::StageError): domain errors for
//! deliberate refusals, `anyhow` errors for anything unexpected.

use async_trait::async_trait;
use twin_types::{CommandResponse, PolicyId, Signal};

use crate::domain::PolicyEnforcer;
use crate::error::StageResult;

/// Interceptor run before policy resolution (blocklists, rate limits, ...).
#[async_trait]
pub trait PreEnforcer: Send + Sync {
    async fn pre_enforce(&self, signal: Signal) -> StageResult<Signal>;
}

/// Maps signals and responses to the policy governing them.
#[async_trait]
pub trait PolicyIdResolver: Send + Sync {
    /// Fails only with domain errors.
    async fn resolve_for_signal(&self, signal: &Signal) -> StageResult<PolicyId>;

    async fn resolve_for_response(&self, response: &CommandResponse) -> StageResult<PolicyId>;
}

/// Loads (and typically caches) policy enforcers.
///
/// A policy that does not exist is `Ok(None)`, never an error.
#[async_trait]
pub trait PolicyEnforcerProvider: Send + Sync {
    async fn get_policy_enforcer(&self, policy_id: &PolicyId) -> StageResult<Option<PolicyEnforcer>>;
}

/// Loads one policy enforcer from its source of truth.
///
/// Wrapped by [`CachingPolicyEnforcerProvider`](crate::adapters::CachingPolicyEnforcerProvider).
#[async_trait]
pub trait PolicyEnforcerLoader: Send + Sync {
    async fn load(&self, policy_id: &PolicyId) -> StageResult<Option<PolicyEnforcer>>;
}

/// Entity-type specific authorization and filtering.
#[async_trait]
pub trait EnforcementStrategy: Send + Sync {
    /// Authorize `signal` against a loaded enforcer.
    async fn authorize_signal(&self, signal: Signal, enforcer: &PolicyEnforcer) -> StageResult<Signal>;

    /// Authorize `signal` when its policy does not exist (yet).
    async fn authorize_signal_with_missing_enforcer(&self, signal: Signal) -> StageResult<Signal>;

    /// Whether `response` must be filtered before it leaves the entity.
    fn should_filter_command_response(&self, response: &CommandResponse) -> bool;

    /// Reduce `response` to what its requester may see.
    async fn filter_response(
        &self,
        response: CommandResponse,
        enforcer: &PolicyEnforcer,
    ) -> StageResult<CommandResponse>;
}

/// Optional pipeline extension points. Every hook defaults to identity.
#[async_trait]
pub trait EnforcementHooks: Send + Sync {
    /// Validate an authorized signal against the entity's semantic model.
    async fn validate_signal(&self, signal: Signal) -> StageResult<Signal> {
        Ok(signal)
    }

    /// Attach derived header fields to an authorized signal.
    async fn enrich_signal(&self, signal: Signal) -> StageResult<Signal> {
        Ok(signal)
    }

    /// Validate a filtered response against the entity's semantic model.
    async fn validate_response(&self, response: CommandResponse) -> StageResult<CommandResponse> {
        Ok(response)
    }
}
