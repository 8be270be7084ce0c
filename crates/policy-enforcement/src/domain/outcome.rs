//! Pipeline outcomes

use twin_types::{CommandResponse, DittoHeaders, EnforcementError, Signal};

/// The single result of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The signal may proceed to the entity.
    AuthorizedSignal(Signal),
    /// The response, reduced to what the requester may see.
    FilteredResponse(CommandResponse),
    /// The message was refused or enforcement failed.
    Rejection(EnforcementError),
}

impl Outcome {
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejection(_))
    }

    pub fn headers(&self) -> &DittoHeaders {
        match self {
            Self::AuthorizedSignal(signal) => signal.headers(),
            Self::FilteredResponse(response) => response.headers(),
            Self::Rejection(error) => error.headers(),
        }
    }

    /// Label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        if self.is_rejection() {
            "failure"
        } else {
            "success"
        }
    }

    pub fn into_signal(self) -> Option<Signal> {
        match self {
            Self::AuthorizedSignal(signal) => Some(signal),
            _ => None,
        }
    }

    pub fn into_response(self) -> Option<CommandResponse> {
        match self {
            Self::FilteredResponse(response) => Some(response),
            _ => None,
        }
    }

    pub fn into_error(self) -> Option<EnforcementError> {
        match self {
            Self::Rejection(error) => Some(error),
            _ => None,
        }
    }
}

impl From<EnforcementError> for Outcome {
    fn from(error: EnforcementError) -> Self {
        Self::Rejection(error)
    }
}
