//! # Signals and Command Responses
//!
//! A `Signal` is an authorization-pending command, query or event addressed
//! to an entity. A `CommandResponse` is the entity's answer whose payload may
//! be filtered down to the fields the requester is allowed to see.
//!
//! Both are immutable: headers are copy-on-write, `with_*` returns a new value.

use crate::entities::EntityId;
use crate::headers::DittoHeaders;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a signal asks the entity to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    /// Mutates the entity.
    Command,
    /// Reads the entity.
    Query,
    /// Reports something that happened to the entity.
    Event,
}

/// An authorization-pending signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    headers: DittoHeaders,
    entity_id: EntityId,
    kind: SignalKind,
    signal_type: String,
    resource_path: String,
    payload: Value,
}

impl Signal {
    pub fn new(
        entity_id: EntityId,
        kind: SignalKind,
        signal_type: impl Into<String>,
        headers: DittoHeaders,
    ) -> Self {
        Self {
            headers,
            entity_id,
            kind,
            signal_type: signal_type.into(),
            resource_path: "/".to_string(),
            payload: Value::Null,
        }
    }

    /// Return a copy addressing the given resource path within the entity.
    #[must_use]
    pub fn with_resource_path(mut self, resource_path: impl Into<String>) -> Self {
        self.resource_path = resource_path.into();
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Return a copy carrying `headers` instead of the current ones.
    #[must_use]
    pub fn with_headers(&self, headers: DittoHeaders) -> Self {
        Self {
            headers,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn headers(&self) -> &DittoHeaders {
        &self.headers
    }

    #[must_use]
    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    #[must_use]
    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    #[must_use]
    pub fn signal_type(&self) -> &str {
        &self.signal_type
    }

    #[must_use]
    pub fn resource_path(&self) -> &str {
        &self.resource_path
    }

    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }
}

/// Category of a command response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseKind {
    /// Acknowledges a modifying command.
    Modify,
    /// Carries (possibly sensitive) entity data back to the requester.
    Query,
}

/// Result value produced by an entity for a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    headers: DittoHeaders,
    entity_id: EntityId,
    kind: ResponseKind,
    response_type: String,
    status: u16,
    resource_path: String,
    payload: Value,
}

impl CommandResponse {
    pub fn new(
        entity_id: EntityId,
        kind: ResponseKind,
        response_type: impl Into<String>,
        status: u16,
        headers: DittoHeaders,
    ) -> Self {
        Self {
            headers,
            entity_id,
            kind,
            response_type: response_type.into(),
            status,
            resource_path: "/".to_string(),
            payload: Value::Null,
        }
    }

    #[must_use]
    pub fn with_resource_path(mut self, resource_path: impl Into<String>) -> Self {
        self.resource_path = resource_path.into();
        self
    }

    /// Return a copy carrying `payload`, used when filtering.
    #[must_use]
    pub fn with_payload(&self, payload: Value) -> Self {
        Self {
            payload,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_headers(&self, headers: DittoHeaders) -> Self {
        Self {
            headers,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn headers(&self) -> &DittoHeaders {
        &self.headers
    }

    #[must_use]
    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    #[must_use]
    pub fn kind(&self) -> ResponseKind {
        self.kind
    }

    #[must_use]
    pub fn response_type(&self) -> &str {
        &self.response_type
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    #[must_use]
    pub fn resource_path(&self) -> &str {
        &self.resource_path
    }

    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }
}
