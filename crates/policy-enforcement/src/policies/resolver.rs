//! A policy is governed by itself.

use async_trait::async_trait;
use twin_types::{CommandResponse, DittoHeaders, EnforcementError, EntityId, EntityType, PolicyId, Signal};

use crate::error::StageResult;
use crate::ports::PolicyIdResolver;

/// Resolves a policy signal to the policy it addresses.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicySignalPolicyIdResolver;

fn own_policy_id(entity_id: &EntityId, headers: &DittoHeaders) -> StageResult<PolicyId> {
    if entity_id.entity_type() != EntityType::Policy {
        return Err(EnforcementError::ValidationFailed {
            description: format!(
                "'{entity_id}' is a {} and not governed by the policy enforcer",
                entity_id.entity_type().as_str()
            ),
            headers: headers.clone(),
        }
        .into());
    }
    Ok(entity_id.to_policy_id())
}

#[async_trait]
impl PolicyIdResolver for PolicySignalPolicyIdResolver {
    async fn resolve_for_signal(&self, signal: &Signal) -> StageResult<PolicyId> {
        own_policy_id(signal.entity_id(), signal.headers())
    }

    async fn resolve_for_response(&self, response: &CommandResponse) -> StageResult<PolicyId> {
        own_policy_id(response.entity_id(), response.headers())
    }
}
