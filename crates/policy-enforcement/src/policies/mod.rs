//! Enforcement for the `policy` entity type.
//!
//! Plug [`PolicySignalPolicyIdResolver`] and [`PolicyCommandEnforcement`]
//! into [`EnforcementCollaborators`](crate::EnforcementCollaborators) together
//! with a provider that loads policy enforcers.

pub mod resolver;
pub mod strategy;

pub use resolver::PolicySignalPolicyIdResolver;
pub use strategy::PolicyCommandEnforcement;

/// Resource type policy permissions are granted on.
pub const POLICY_RESOURCE_TYPE: &str = "policy";

/// Signal types of the policy entity.
pub mod signal_types {
    pub const CREATE_POLICY: &str = "policies.commands:createPolicy";
    pub const MODIFY_POLICY: &str = "policies.commands:modifyPolicy";
    pub const DELETE_POLICY: &str = "policies.commands:deletePolicy";
    pub const RETRIEVE_POLICY: &str = "policies.queries:retrievePolicy";
}
