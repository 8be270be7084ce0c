//! # Entity and Policy Identifiers
//!
//! Identifiers are namespaced: `namespace:name`. The namespace may be empty,
//! the name may not.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors parsing a namespaced identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// The `:` separator is missing.
    #[error("Identifier '{0}' is not of the form 'namespace:name'")]
    MissingSeparator(String),

    /// The name part is empty.
    #[error("Identifier '{0}' has an empty name")]
    EmptyName(String),
}

fn split_namespaced(raw: &str) -> Result<(String, String), IdError> {
    let (namespace, name) = raw
        .split_once(':')
        .ok_or_else(|| IdError::MissingSeparator(raw.to_string()))?;
    if name.is_empty() {
        return Err(IdError::EmptyName(raw.to_string()));
    }
    Ok((namespace.to_string(), name.to_string()))
}

/// Kinds of entity guarded by an enforcer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    /// A digital twin.
    Thing,
    /// An authorization policy.
    Policy,
    /// A connectivity connection.
    Connection,
}

impl EntityType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thing => "thing",
            Self::Policy => "policy",
            Self::Connection => "connection",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a policy, namespaced like the entities it governs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicyId {
    namespace: String,
    name: String,
}

impl PolicyId {
    /// Build a policy id from its parts.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

impl FromStr for PolicyId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, name) = split_namespaced(s)?;
        Ok(Self { namespace, name })
    }
}

/// Identifier of the entity a signal is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId {
    entity_type: EntityType,
    namespace: String,
    name: String,
}

impl EntityId {
    pub fn new(
        entity_type: EntityType,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            entity_type,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse `namespace:name` for the given entity type.
    pub fn parse(entity_type: EntityType, raw: &str) -> Result<Self, IdError> {
        let (namespace, name) = split_namespaced(raw)?;
        Ok(Self {
            entity_type,
            namespace,
            name,
        })
    }

    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The policy id sharing this entity's namespace and name.
    #[must_use]
    pub fn to_policy_id(&self) -> PolicyId {
        PolicyId::new(self.namespace.clone(), self.name.clone())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}
