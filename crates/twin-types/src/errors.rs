//! # Error Types
//!
//! Structured errors delivered to the caller of an enforcement pipeline.
//! Every variant carries the headers that were in flight when it was raised
//! so the reply can be correlated.

use crate::entities::{EntityId, PolicyId};
use crate::headers::DittoHeaders;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Stable error codes, independent of the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    PolicyNotAccessible,
    SignalNotAuthorized,
    NamespaceBlocked,
    ValidationFailed,
    EnforcementTimeout,
    Internal,
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PolicyNotAccessible => "policies:policy.notfound",
            Self::SignalNotAuthorized => "enforcement:signal.notallowed",
            Self::NamespaceBlocked => "namespace:blocked",
            Self::ValidationFailed => "wot:validation.failed",
            Self::EnforcementTimeout => "enforcement:timeout",
            Self::Internal => "internalerror",
        }
    }

    /// HTTP-like status a caller facing surface would use.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::PolicyNotAccessible => 404,
            Self::SignalNotAuthorized => 403,
            Self::NamespaceBlocked => 409,
            Self::ValidationFailed => 400,
            Self::EnforcementTimeout => 408,
            Self::Internal => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors an enforcement pipeline replies with.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnforcementError {
    /// The policy does not exist or the requester may not access it.
    #[error("The policy with ID '{policy_id}' could not be found or the requester had insufficient permissions to access it")]
    PolicyNotAccessible {
        policy_id: PolicyId,
        headers: DittoHeaders,
    },

    /// The policy denies the signal.
    #[error("The requester has insufficient permissions to execute '{signal_type}' on '{entity_id}'")]
    SignalNotAuthorized {
        entity_id: EntityId,
        signal_type: String,
        headers: DittoHeaders,
    },

    /// Signals into this namespace are currently refused.
    #[error("Namespace '{namespace}' is blocked")]
    NamespaceBlocked {
        namespace: String,
        headers: DittoHeaders,
    },

    /// The signal or response does not conform to the entity's model.
    #[error("Validation failed: {description}")]
    ValidationFailed {
        description: String,
        headers: DittoHeaders,
    },

    /// The pipeline did not complete within the configured bound.
    #[error("Enforcement did not complete within {timeout:?}")]
    EnforcementTimeout {
        timeout: Duration,
        headers: DittoHeaders,
    },

    /// Anything unexpected, wrapped with its cause.
    #[error("An unexpected error occurred during enforcement: {cause}")]
    Internal {
        cause: String,
        headers: DittoHeaders,
    },
}

impl EnforcementError {
    /// Wrap an unexpected cause.
    pub fn internal(cause: impl Into<String>, headers: DittoHeaders) -> Self {
        Self::Internal {
            cause: cause.into(),
            headers,
        }
    }

    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::PolicyNotAccessible { .. } => ErrorCode::PolicyNotAccessible,
            Self::SignalNotAuthorized { .. } => ErrorCode::SignalNotAuthorized,
            Self::NamespaceBlocked { .. } => ErrorCode::NamespaceBlocked,
            Self::ValidationFailed { .. } => ErrorCode::ValidationFailed,
            Self::EnforcementTimeout { .. } => ErrorCode::EnforcementTimeout,
            Self::Internal { .. } => ErrorCode::Internal,
        }
    }

    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    #[must_use]
    pub fn headers(&self) -> &DittoHeaders {
        match self {
            Self::PolicyNotAccessible { headers, .. }
            | Self::SignalNotAuthorized { headers, .. }
            | Self::NamespaceBlocked { headers, .. }
            | Self::ValidationFailed { headers, .. }
            | Self::EnforcementTimeout { headers, .. }
            | Self::Internal { headers, .. } => headers,
        }
    }

    /// Return a copy carrying `headers`.
    #[must_use]
    pub fn with_headers(mut self, new_headers: DittoHeaders) -> Self {
        match &mut self {
            Self::PolicyNotAccessible { headers, .. }
            | Self::SignalNotAuthorized { headers, .. }
            | Self::NamespaceBlocked { headers, .. }
            | Self::ValidationFailed { headers, .. }
            | Self::EnforcementTimeout { headers, .. }
            | Self::Internal { headers, .. } => *headers = new_headers,
        }
        self
    }
}
