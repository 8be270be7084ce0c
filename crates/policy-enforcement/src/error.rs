//! Error types for policy enforcement

use std::any::Any;
use std::time::Duration;

use thiserror::Error;
use twin_types::{DittoHeaders, EnforcementError};

/// What a pipeline stage (collaborator) fails with.
///
/// Domain errors are raised deliberately and reach the caller verbatim.
/// Anything else is unexpected and gets wrapped by [`classify`].
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Domain(#[from] EnforcementError),

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

/// Result of a pipeline stage.
pub type StageResult<T> = Result<T, StageError>;

/// Turn a stage failure into the error delivered to the caller.
///
/// Domain errors pass through unchanged. Everything else becomes an
/// internal error carrying the cause and `headers`. Never fails.
pub fn classify(error: StageError, headers: &DittoHeaders) -> EnforcementError {
    match error {
        StageError::Domain(error) => error,
        StageError::Unexpected(cause) => EnforcementError::internal(format!("{cause:#}"), headers.clone()),
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Invalid enforcement configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {variable}: {reason}")]
    InvalidVariable {
        variable: &'static str,
        value: String,
        reason: String,
    },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("Invalid extra header field: {0}")]
    InvalidHeaderField(String),
}

/// Failure to set up the enforcement pool.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("No Tokio runtime is running on this thread")]
    NoRuntime,

    #[error("Failed to build enforcement runtime: {0}")]
    Build(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Failure of a request/reply exchange with an enforcer.
#[derive(Debug, Error)]
pub enum AskError {
    #[error("No reply within {0:?}")]
    Timeout(Duration),

    #[error("Enforcer mailbox is closed")]
    MailboxClosed,

    #[error("Reply channel closed without a reply")]
    NoReply,
}
