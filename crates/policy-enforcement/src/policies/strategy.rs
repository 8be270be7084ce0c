//! Enforcement of signals addressed to policies.

use async_trait::async_trait;
use tracing::debug;
use twin_types::{CommandResponse, EnforcementError, ResponseKind, Signal, SignalKind};

use crate::domain::{Permission, PolicyEnforcer, ResourceKey};
use crate::error::StageResult;
use crate::policies::{signal_types, POLICY_RESOURCE_TYPE};
use crate::ports::EnforcementStrategy;

/// Authorizes policy commands and queries and filters query responses.
///
/// Commands need unrestricted `WRITE` on the addressed resource, queries
/// need `READ` on at least part of it. Without an enforcer only policy
/// creation is allowed.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyCommandEnforcement;

#[async_trait]
impl EnforcementStrategy for PolicyCommandEnforcement {
    async fn authorize_signal(&self, signal: Signal, policy_enforcer: &PolicyEnforcer) -> StageResult<Signal> {
        let subjects = signal.headers().authorization_subjects();
        let resource = ResourceKey::new(POLICY_RESOURCE_TYPE, signal.resource_path());
        let enforcer = policy_enforcer.enforcer();

        let authorized = match signal.kind() {
            SignalKind::Query => enforcer.has_partial_permissions(&resource, &subjects, Permission::Read),
            SignalKind::Command | SignalKind::Event => {
                enforcer.has_unrestricted_permissions(&resource, &subjects, Permission::Write)
            }
        };

        if !authorized {
            return Err(EnforcementError::SignalNotAuthorized {
                entity_id: signal.entity_id().clone(),
                signal_type: signal.signal_type().to_string(),
                headers: signal.headers().clone(),
            }
            .into());
        }

        debug!(
            correlation_id = ?signal.headers().correlation_id(),
            policy_id = %policy_enforcer.policy_id(),
            revision = policy_enforcer.revision(),
            %resource,
            "Policy signal authorized"
        );
        Ok(signal)
    }

    async fn authorize_signal_with_missing_enforcer(&self, signal: Signal) -> StageResult<Signal> {
        if signal.signal_type() == signal_types::CREATE_POLICY {
            return Ok(signal);
        }
        Err(EnforcementError::PolicyNotAccessible {
            policy_id: signal.entity_id().to_policy_id(),
            headers: signal.headers().clone(),
        }
        .into())
    }

    fn should_filter_command_response(&self, response: &CommandResponse) -> bool {
        response.kind() == ResponseKind::Query
    }

    async fn filter_response(
        &self,
        response: CommandResponse,
        policy_enforcer: &PolicyEnforcer,
    ) -> StageResult<CommandResponse> {
        let subjects = response.headers().authorization_subjects();
        let resource = ResourceKey::new(POLICY_RESOURCE_TYPE, response.resource_path());
        let visible = policy_enforcer.enforcer().filter_fields(
            &resource,
            response.payload(),
            &subjects,
            Permission::Read,
        );
        Ok(response.with_payload(visible))
    }
}
