//! Authorization pipeline
//!
//! ```text
//! pre-enforce → resolve policy id → load enforcer → authorize
//!             → validate → enrich → Outcome
//! ```
//!
//! Stages run strictly one after another; the first failure short-circuits
//! the rest. Every run ends in exactly one [`Outcome`] and finishes its span
//! exactly once.

use std::time::Duration;

use tracing::{info, warn};
use twin_telemetry::metrics::{pipeline, HistogramTimer, InFlightGuard, SIGNALS_ENFORCED};
use twin_telemetry::{marks, Tracer, TracingSpan};
use twin_types::headers::keys;
use twin_types::{DittoHeaders, EnforcementError, Signal};

use crate::domain::Outcome;
use crate::error::{classify, StageError, StageResult};
use crate::service::stage::guarded;
use crate::service::EnforcementCollaborators;

/// Owns the span of one pipeline run.
///
/// A span that is neither succeeded nor failed when the guard goes away
/// (the run panicked or was cancelled) is marked `enforce_error`.
pub(crate) struct SpanGuard {
    span: Option<Box<dyn TracingSpan>>,
}

impl SpanGuard {
    pub(crate) fn start(tracer: &dyn Tracer, headers: &DittoHeaders) -> Self {
        Self {
            span: Some(tracer.start_span(marks::ENFORCE_POLICY, headers)),
        }
    }

    fn mark(&mut self, name: &'static str) {
        if let Some(span) = self.span.as_mut() {
            span.mark(name);
        }
    }

    fn propagate_context(&self, headers: DittoHeaders) -> DittoHeaders {
        match &self.span {
            Some(span) => span.propagate_context(headers),
            None => headers,
        }
    }

    fn succeed(mut self) {
        if let Some(mut span) = self.span.take() {
            span.mark(marks::ENFORCE_SUCCESS);
            span.finish();
        }
    }

    fn fail(mut self, error: &EnforcementError) {
        if let Some(mut span) = self.span.take() {
            span.mark(marks::ENFORCE_FAILED);
            span.tag_as_failed(error);
            span.finish();
        }
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        if let Some(mut span) = self.span.take() {
            span.mark(marks::ENFORCE_ERROR);
            warn!(
                operation = span.operation(),
                "Enforcement ended with neither an authorized signal nor an error"
            );
            span.finish();
        }
    }
}

/// Authorize `signal` for its entity.
///
/// The returned signal carries the caller's original trace-parent, not the
/// one of the enforcement span.
pub async fn authorize(
    collaborators: &EnforcementCollaborators,
    signal: Signal,
    timeout: Option<Duration>,
) -> Outcome {
    let _in_flight = InFlightGuard::enter();
    let _timer = HistogramTimer::pipeline(pipeline::AUTHORIZATION);

    let caller_headers = signal.headers().clone();
    let entity_id = signal.entity_id().clone();
    let signal_type = signal.signal_type().to_string();

    let mut span = SpanGuard::start(collaborators.tracer.as_ref(), &caller_headers);
    let traced = signal.with_headers(span.propagate_context(caller_headers.clone()));

    let stages = run_stages(collaborators, traced, &mut span);
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, stages).await {
            Ok(result) => result,
            Err(_) => Err(StageError::Domain(EnforcementError::EnforcementTimeout {
                timeout: limit,
                headers: caller_headers.clone(),
            })),
        },
        None => stages.await,
    };

    match result {
        Ok(authorized) => {
            span.succeed();
            let authorized = restore_caller_trace(authorized, &caller_headers);
            info!(
                correlation_id = ?caller_headers.correlation_id(),
                entity_id = %entity_id,
                signal_type = %signal_type,
                outcome = "success",
                "Completed enforcement of signal"
            );
            SIGNALS_ENFORCED.with_label_values(&["success"]).inc();
            Outcome::AuthorizedSignal(authorized)
        }
        Err(error) => {
            let error = classify(error, &caller_headers);
            span.fail(&error);
            if error.is_internal() {
                warn!(
                    correlation_id = ?caller_headers.correlation_id(),
                    entity_id = %entity_id,
                    signal_type = %signal_type,
                    outcome = "failure",
                    error = %error,
                    "Unexpected error during enforcement of signal"
                );
            } else {
                info!(
                    correlation_id = ?caller_headers.correlation_id(),
                    entity_id = %entity_id,
                    signal_type = %signal_type,
                    outcome = "failure",
                    error_code = %error.error_code(),
                    "Completed enforcement of signal"
                );
            }
            SIGNALS_ENFORCED.with_label_values(&["failure"]).inc();
            Outcome::Rejection(error)
        }
    }
}

async fn run_stages(
    collaborators: &EnforcementCollaborators,
    traced: Signal,
    span: &mut SpanGuard,
) -> StageResult<Signal> {
    let pre_enforced = guarded("pre_enforce", || collaborators.pre_enforcer.pre_enforce(traced)).await?;
    span.mark(marks::PRE_ENFORCED);

    let policy_id = guarded("resolve_policy_id", || {
        collaborators.resolver.resolve_for_signal(&pre_enforced)
    })
    .await?;
    let enforcer = guarded("load_policy_enforcer", || {
        collaborators.provider.get_policy_enforcer(&policy_id)
    })
    .await?;
    span.mark(marks::ENFORCER_LOADED);

    let authorized = match enforcer {
        Some(enforcer) => {
            guarded("authorize_signal", || {
                collaborators.strategy.authorize_signal(pre_enforced, &enforcer)
            })
            .await?
        }
        None => {
            guarded("authorize_signal_with_missing_enforcer", || {
                collaborators
                    .strategy
                    .authorize_signal_with_missing_enforcer(pre_enforced)
            })
            .await?
        }
    };

    let validated = guarded("validate_signal", || collaborators.hooks.validate_signal(authorized)).await?;
    guarded("enrich_signal", || collaborators.hooks.enrich_signal(validated)).await
}

/// Put the caller's trace-parent (and trace-state) back onto `signal`.
///
/// Without a caller trace-parent the span-derived one stays.
fn restore_caller_trace(signal: Signal, caller: &DittoHeaders) -> Signal {
    let Some(trace_parent) = caller.trace_parent() else {
        return signal;
    };

    let mut headers = signal.headers().clone();
    headers.insert(keys::TRACE_PARENT, trace_parent);
    if let Some(trace_state) = caller.get(keys::TRACE_STATE) {
        headers.insert(keys::TRACE_STATE, trace_state);
    } else {
        headers.remove(keys::TRACE_STATE);
    }
    signal.with_headers(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use std::sync::Arc;
    use twin_telemetry::testing::RecordingTracer;
    use twin_types::ErrorCode;

    fn setup(
        provider: MockPolicyEnforcerProvider,
        strategy: MockStrategy,
    ) -> (EnforcementCollaborators, RecordingTracer, Arc<MockPolicyEnforcerProvider>, Arc<MockStrategy>) {
        let tracer = RecordingTracer::new();
        let provider = Arc::new(provider);
        let strategy = Arc::new(strategy);
        let collaborators = EnforcementCollaborators::new(
            Arc::new(EntityPolicyIdResolver),
            provider.clone(),
            strategy.clone(),
        )
        .with_tracer(Arc::new(tracer.clone()));
        (collaborators, tracer, provider, strategy)
    }

    #[tokio::test]
    async fn test_authorized_signal_keeps_correlation_id() {
        let (collaborators, tracer, _, strategy) =
            setup(MockPolicyEnforcerProvider::allowing(), MockStrategy::new());
        let input = thing_signal(DittoHeaders::new().with_correlation_id("c1"));

        let outcome = authorize(&collaborators, input.clone(), None).await;
        let authorized = outcome.into_signal().expect("authorized");

        assert_eq!(authorized.headers().correlation_id(), Some("c1"));
        assert_eq!(authorized.payload(), input.payload());
        assert_eq!(strategy.calls(), vec!["authorize_signal"]);

        let span = tracer.single_span();
        assert_eq!(span.correlation_id.as_deref(), Some("c1"));
        // no caller trace-parent: the span's own one is propagated
        assert_eq!(authorized.headers().trace_parent(), Some(span.trace_parent.as_str()));
        assert_eq!(
            span.marks,
            vec![marks::PRE_ENFORCED, marks::ENFORCER_LOADED, marks::ENFORCE_SUCCESS]
        );
        assert!(span.finished);
        assert!(span.failure.is_none());
    }

    #[tokio::test]
    async fn test_caller_trace_parent_is_restored() {
        let (collaborators, tracer, _, _) =
            setup(MockPolicyEnforcerProvider::allowing(), MockStrategy::new());
        let input = thing_signal(
            DittoHeaders::new()
                .with_correlation_id("c1")
                .with_trace_parent("tp-A")
                .with(keys::TRACE_STATE, "vendor=1"),
        );

        let authorized = authorize(&collaborators, input, None)
            .await
            .into_signal()
            .expect("authorized");

        assert_eq!(authorized.headers().trace_parent(), Some("tp-A"));
        assert_eq!(authorized.headers().get(keys::TRACE_STATE), Some("vendor=1"));
        assert_ne!(tracer.single_span().trace_parent, "tp-A");
    }

    #[tokio::test]
    async fn test_strategy_sees_span_trace_parent() {
        let (collaborators, tracer, _, strategy) =
            setup(MockPolicyEnforcerProvider::allowing(), MockStrategy::new());
        let input = thing_signal(DittoHeaders::new().with_trace_parent("tp-A"));

        authorize(&collaborators, input, None).await;

        let seen = strategy.last_signal().expect("strategy was called");
        assert_eq!(
            seen.headers().trace_parent(),
            Some(tracer.single_span().trace_parent.as_str())
        );
    }

    #[tokio::test]
    async fn test_missing_enforcer_uses_missing_enforcer_authorization() {
        let (collaborators, _, provider, strategy) =
            setup(MockPolicyEnforcerProvider::absent(), MockStrategy::new());

        let outcome = authorize(&collaborators, thing_signal(DittoHeaders::new()), None).await;

        assert!(!outcome.is_rejection());
        assert_eq!(strategy.calls(), vec!["authorize_signal_with_missing_enforcer"]);
        assert_eq!(provider.requested(), vec![thing_policy_id()]);
    }

    #[tokio::test]
    async fn test_domain_rejection_passes_through() {
        let (collaborators, tracer, _, _) = setup(
            MockPolicyEnforcerProvider::allowing(),
            MockStrategy::new().authorize_with(Behaviour::Reject),
        );
        let headers = DittoHeaders::new().with_correlation_id("c1");

        let error = authorize(&collaborators, thing_signal(headers), None)
            .await
            .into_error()
            .expect("rejected");

        assert_eq!(error.error_code(), ErrorCode::SignalNotAuthorized);
        assert_eq!(error.headers().correlation_id(), Some("c1"));

        let span = tracer.single_span();
        assert_eq!(span.marks.last(), Some(&marks::ENFORCE_FAILED));
        assert!(span.failure.is_some());
        assert!(span.finished);
    }

    #[tokio::test]
    async fn test_unexpected_failure_is_wrapped() {
        let (collaborators, _, _, _) = setup(
            MockPolicyEnforcerProvider::allowing(),
            MockStrategy::new().authorize_with(Behaviour::Fail("policy engine crashed")),
        );

        let error = authorize(&collaborators, thing_signal(DittoHeaders::new()), None)
            .await
            .into_error()
            .expect("rejected");

        assert_eq!(error.error_code(), ErrorCode::Internal);
        assert!(error.to_string().contains("policy engine crashed"));
    }

    #[tokio::test]
    async fn test_pre_enforcer_failure_skips_later_stages() {
        let (collaborators, tracer, provider, strategy) =
            setup(MockPolicyEnforcerProvider::allowing(), MockStrategy::new());
        let collaborators =
            collaborators.with_pre_enforcer(Arc::new(MockPreEnforcer::new(Behaviour::Panic("thrown early"))));

        let error = authorize(&collaborators, thing_signal(DittoHeaders::new()), None)
            .await
            .into_error()
            .expect("rejected");

        assert!(error.is_internal());
        assert!(provider.requested().is_empty());
        assert!(strategy.calls().is_empty());
        assert_eq!(tracer.single_span().marks, vec![marks::ENFORCE_FAILED]);
    }

    #[tokio::test]
    async fn test_hooks_run_after_authorization() {
        let (collaborators, _, _, _) =
            setup(MockPolicyEnforcerProvider::allowing(), MockStrategy::new());
        let collaborators = collaborators.with_hooks(Arc::new(
            crate::adapters::ExtraFieldsEnricher::new(vec![("x-region".into(), "eu".into())]),
        ));

        let authorized = authorize(&collaborators, thing_signal(DittoHeaders::new()), None)
            .await
            .into_signal()
            .expect("authorized");
        assert_eq!(authorized.headers().get("x-region"), Some("eu"));
    }

    #[tokio::test]
    async fn test_validation_hook_rejection() {
        let (collaborators, _, _, _) =
            setup(MockPolicyEnforcerProvider::allowing(), MockStrategy::new());
        let collaborators = collaborators.with_hooks(Arc::new(RejectingValidator));

        let error = authorize(&collaborators, thing_signal(DittoHeaders::new()), None)
            .await
            .into_error()
            .expect("rejected");
        assert_eq!(error.error_code(), ErrorCode::ValidationFailed);
    }

    #[tokio::test]
    async fn test_timeout_rejects_stalled_pipeline() {
        let (collaborators, tracer, _, _) = setup(
            MockPolicyEnforcerProvider::allowing(),
            MockStrategy::new().authorize_with(Behaviour::Stall),
        );

        let error = authorize(
            &collaborators,
            thing_signal(DittoHeaders::new()),
            Some(Duration::from_millis(50)),
        )
        .await
        .into_error()
        .expect("timed out");

        assert_eq!(error.error_code(), ErrorCode::EnforcementTimeout);
        assert_eq!(tracer.single_span().marks.last(), Some(&marks::ENFORCE_FAILED));
    }

    #[tokio::test]
    async fn test_authorization_is_idempotent() {
        let (collaborators, _, _, _) =
            setup(MockPolicyEnforcerProvider::allowing(), MockStrategy::new());
        let input = thing_signal(DittoHeaders::new().with_correlation_id("c1"));

        let first = authorize(&collaborators, input.clone(), None).await.into_signal().unwrap();
        let second = authorize(&collaborators, input, None).await.into_signal().unwrap();

        // headers differ by span trace-parent only
        assert_eq!(first.with_headers(DittoHeaders::new()), second.with_headers(DittoHeaders::new()));
    }

    #[test]
    fn test_dropped_guard_marks_enforce_error() {
        let tracer = RecordingTracer::new();
        let mut guard = SpanGuard::start(&tracer, &DittoHeaders::new());
        guard.mark(marks::PRE_ENFORCED);
        drop(guard);

        let span = tracer.single_span();
        assert_eq!(span.marks, vec![marks::PRE_ENFORCED, marks::ENFORCE_ERROR]);
        assert!(span.finished);
    }
}
