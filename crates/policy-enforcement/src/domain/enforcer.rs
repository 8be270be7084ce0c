//! The compiled policy capability
//!
//! How an `Enforcer` evaluates permission rules is not this crate's concern;
//! pipelines and strategies only ask it questions.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use twin_types::PolicyId;

/// Permission asked of an enforcer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    Read,
    Write,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "READ",
            Self::Write => "WRITE",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resource inside an entity, e.g. `policy:/entries/owner`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    resource_type: String,
    path: String,
}

impl ResourceKey {
    pub fn new(resource_type: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            resource_type: resource_type.into(),
            path: if path.starts_with('/') {
                path
            } else {
                format!("/{path}")
            },
        }
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.path)
    }
}

/// Permission evaluation engine compiled from a policy document.
pub trait Enforcer: Send + Sync + fmt::Debug {
    /// Whether `subjects` hold `permission` on `resource` and everything below it.
    fn has_unrestricted_permissions(
        &self,
        resource: &ResourceKey,
        subjects: &[String],
        permission: Permission,
    ) -> bool;

    /// Whether `subjects` hold `permission` on `resource` or anything below it.
    fn has_partial_permissions(
        &self,
        resource: &ResourceKey,
        subjects: &[String],
        permission: Permission,
    ) -> bool;

    /// Reduce `value` (located at `resource`) to the fields `subjects` hold
    /// `permission` on.
    fn filter_fields(
        &self,
        resource: &ResourceKey,
        value: &Value,
        subjects: &[String],
        permission: Permission,
    ) -> Value;
}

/// Immutable snapshot of a policy and its enforcer, fetched by id.
#[derive(Debug, Clone)]
pub struct PolicyEnforcer {
    policy_id: PolicyId,
    revision: u64,
    enforcer: Arc<dyn Enforcer>,
}

impl PolicyEnforcer {
    pub fn new(policy_id: PolicyId, revision: u64, enforcer: Arc<dyn Enforcer>) -> Self {
        Self {
            policy_id,
            revision,
            enforcer,
        }
    }

    pub fn policy_id(&self) -> &PolicyId {
        &self.policy_id
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn enforcer(&self) -> &dyn Enforcer {
        self.enforcer.as_ref()
    }
}

/// Snapshots are equal when they describe the same policy revision.
impl PartialEq for PolicyEnforcer {
    fn eq(&self, other: &Self) -> bool {
        self.policy_id == other.policy_id && self.revision == other.revision
    }
}
