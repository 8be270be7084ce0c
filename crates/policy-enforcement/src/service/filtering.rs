//! Response-filtering pipeline
//!
//! Responses the strategy does not want filtered bypass the pipeline
//! untouched. All others go through
//! resolve policy id → load enforcer → filter → validate.

use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use tracing::{debug, info, warn};
use twin_telemetry::metrics::{pipeline, HistogramTimer, InFlightGuard, RESPONSES_FILTERED};
use twin_types::{CommandResponse, DittoHeaders, EnforcementError};

use crate::domain::Outcome;
use crate::error::{classify, panic_message, StageError, StageResult};
use crate::service::stage::guarded;
use crate::service::EnforcementCollaborators;

/// What happened to a response handed to [`filter_if_needed`].
#[derive(Debug, Clone, PartialEq)]
pub enum Filtering {
    /// Filtering was not required; the response is the input, unchanged.
    Bypassed(CommandResponse),
    /// The pipeline ran and produced this outcome.
    Completed(Outcome),
}

/// Ask the strategy whether `response` must be filtered.
///
/// A panicking strategy counts as a failure of the filtering pipeline.
pub fn needs_filtering(
    collaborators: &EnforcementCollaborators,
    response: &CommandResponse,
) -> Result<bool, EnforcementError> {
    let strategy = collaborators.strategy.as_ref();
    panic::catch_unwind(AssertUnwindSafe(|| strategy.should_filter_command_response(response)))
        .map_err(|payload| {
            EnforcementError::internal(
                format!(
                    "should_filter_command_response panicked: {}",
                    panic_message(payload.as_ref())
                ),
                response.headers().clone(),
            )
        })
}

/// Filter `response` if the strategy requires it.
pub async fn filter_if_needed(
    collaborators: &EnforcementCollaborators,
    response: CommandResponse,
    timeout: Option<Duration>,
) -> Filtering {
    match needs_filtering(collaborators, &response) {
        Ok(false) => {
            record_bypass(&response);
            Filtering::Bypassed(response)
        }
        Ok(true) => Filtering::Completed(filter(collaborators, response, timeout).await),
        Err(error) => {
            RESPONSES_FILTERED.with_label_values(&["failure"]).inc();
            Filtering::Completed(Outcome::Rejection(error))
        }
    }
}

pub(crate) fn record_bypass(response: &CommandResponse) {
    debug!(
        correlation_id = ?response.headers().correlation_id(),
        response_type = %response.response_type(),
        "Response does not need filtering"
    );
    RESPONSES_FILTERED.with_label_values(&["bypassed"]).inc();
}

/// Run the filtering stages for a response that must be filtered.
pub async fn filter(
    collaborators: &EnforcementCollaborators,
    response: CommandResponse,
    timeout: Option<Duration>,
) -> Outcome {
    let _in_flight = InFlightGuard::enter();
    let _timer = HistogramTimer::pipeline(pipeline::FILTERING);

    let headers = response.headers().clone();
    let entity_id = response.entity_id().clone();
    let response_type = response.response_type().to_string();

    let stages = run_stages(collaborators, response, &headers);
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, stages).await {
            Ok(result) => result,
            Err(_) => Err(StageError::Domain(EnforcementError::EnforcementTimeout {
                timeout: limit,
                headers: headers.clone(),
            })),
        },
        None => stages.await,
    };

    match result {
        Ok(filtered) => {
            info!(
                correlation_id = ?headers.correlation_id(),
                entity_id = %entity_id,
                response_type = %response_type,
                outcome = "success",
                "Completed filtering of command response"
            );
            RESPONSES_FILTERED.with_label_values(&["filtered"]).inc();
            Outcome::FilteredResponse(filtered)
        }
        Err(error) => {
            let error = classify(error, &headers);
            warn!(
                correlation_id = ?headers.correlation_id(),
                entity_id = %entity_id,
                response_type = %response_type,
                outcome = "failure",
                error = %error,
                "Filtering of command response failed"
            );
            RESPONSES_FILTERED.with_label_values(&["failure"]).inc();
            Outcome::Rejection(error)
        }
    }
}

async fn run_stages(
    collaborators: &EnforcementCollaborators,
    response: CommandResponse,
    headers: &DittoHeaders,
) -> StageResult<CommandResponse> {
    let policy_id = guarded("resolve_policy_id", || {
        collaborators.resolver.resolve_for_response(&response)
    })
    .await?;
    let enforcer = guarded("load_policy_enforcer", || {
        collaborators.provider.get_policy_enforcer(&policy_id)
    })
    .await?;

    // the policy may have been deleted while the command was processed
    let Some(enforcer) = enforcer else {
        return Err(EnforcementError::PolicyNotAccessible {
            policy_id,
            headers: headers.clone(),
        }
        .into());
    };

    let filtered = guarded("filter_response", || {
        collaborators.strategy.filter_response(response, &enforcer)
    })
    .await?;
    guarded("validate_response", || collaborators.hooks.validate_response(filtered)).await
}
