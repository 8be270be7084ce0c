//! # Enforcer Flows
//!
//! Drives a spawned enforcer through its handle the way a supervisor does:
//! signals and responses go into the mailbox, outcomes come back on the
//! sender's and the parent's reply channels.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::timeout;

    use policy_enforcement::actor::DISPATCHER_THREAD_NAME;
    use policy_enforcement::test_utils::{
        thing_id, thing_response, thing_signal, Behaviour, EntityPolicyIdResolver, MockPolicyEnforcerProvider,
        MockStrategy,
    };
    use policy_enforcement::{
        Address, EnforcementCollaborators, EnforcementConfig, EnforcementCore, EnforcementMessage,
        EnforcementPool, EnforcementStrategy, EnforcerHandle, Outcome, PolicyEnforcer,
        PreEnforcerChain, Reply, StageResult,
    };
    use twin_types::{CommandResponse, DittoHeaders, ErrorCode, ResponseKind, Signal};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    const REPLY_WAIT: Duration = Duration::from_secs(2);

    fn collaborators(
        provider: Arc<MockPolicyEnforcerProvider>,
        strategy: Arc<dyn EnforcementStrategy>,
    ) -> EnforcementCollaborators {
        EnforcementCollaborators::new(Arc::new(EntityPolicyIdResolver), provider, strategy)
    }

    /// Spawn an enforcer on the test runtime; returns its handle and the
    /// parent's reply channel.
    fn spawn_enforcer(
        collaborators: EnforcementCollaborators,
    ) -> (EnforcerHandle, UnboundedReceiver<Reply>) {
        let (parent, parent_replies) = Address::new("supervisor");
        let pool = EnforcementPool::current().expect("inside a runtime");
        let handle = EnforcementCore::new(collaborators, parent, pool).spawn();
        (handle, parent_replies)
    }

    async fn next_reply(replies: &mut UnboundedReceiver<Reply>) -> Reply {
        timeout(REPLY_WAIT, replies.recv())
            .await
            .expect("reply in time")
            .expect("channel open")
    }

    /// Panics on signals of type `boom`, authorizes everything else.
    struct TripwireStrategy;

    #[async_trait]
    impl EnforcementStrategy for TripwireStrategy {
        async fn authorize_signal(&self, signal: Signal, _: &PolicyEnforcer) -> StageResult<Signal> {
            if signal.signal_type() == "boom" {
                panic!("tripwire");
            }
            Ok(signal)
        }

        async fn authorize_signal_with_missing_enforcer(&self, signal: Signal) -> StageResult<Signal> {
            Ok(signal)
        }

        fn should_filter_command_response(&self, _: &CommandResponse) -> bool {
            true
        }

        async fn filter_response(
            &self,
            response: CommandResponse,
            _: &PolicyEnforcer,
        ) -> StageResult<CommandResponse> {
            Ok(response)
        }
    }

    /// Records the name of the thread authorization ran on.
    #[derive(Default)]
    struct ThreadRecordingStrategy {
        threads: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl EnforcementStrategy for ThreadRecordingStrategy {
        async fn authorize_signal(&self, signal: Signal, _: &PolicyEnforcer) -> StageResult<Signal> {
            let name = std::thread::current().name().map(str::to_string);
            self.threads.lock().push(name);
            Ok(signal)
        }

        async fn authorize_signal_with_missing_enforcer(&self, signal: Signal) -> StageResult<Signal> {
            Ok(signal)
        }

        fn should_filter_command_response(&self, _: &CommandResponse) -> bool {
            false
        }

        async fn filter_response(
            &self,
            response: CommandResponse,
            _: &PolicyEnforcer,
        ) -> StageResult<CommandResponse> {
            Ok(response)
        }
    }

    // =============================================================================
    // AUTHORIZATION
    // =============================================================================

    #[tokio::test]
    async fn test_authorized_signal_carries_caller_trace_parent() {
        let (enforcer, _parent) = spawn_enforcer(collaborators(
            Arc::new(MockPolicyEnforcerProvider::allowing()),
            Arc::new(MockStrategy::new()),
        ));
        let headers = DittoHeaders::new()
            .with_correlation_id("c1")
            .with_trace_parent("tp-A");

        let outcome = enforcer.ask_signal(thing_signal(headers)).await.unwrap();
        let authorized = outcome.into_signal().expect("authorized");

        assert_eq!(authorized.headers().correlation_id(), Some("c1"));
        assert_eq!(authorized.headers().trace_parent(), Some("tp-A"));
    }

    #[tokio::test]
    async fn test_blocked_namespace_is_refused_before_policy_lookup() {
        let config = EnforcementConfig::default().with_blocked_namespace("ns");
        let provider = Arc::new(MockPolicyEnforcerProvider::allowing());
        let collaborators = collaborators(provider.clone(), Arc::new(MockStrategy::new()))
            .with_pre_enforcer(Arc::new(PreEnforcerChain::from_config(&config)));
        let (enforcer, _parent) = spawn_enforcer(collaborators);

        let outcome = enforcer
            .ask_signal(thing_signal(DittoHeaders::new().with_correlation_id("c1")))
            .await
            .unwrap();
        let error = outcome.into_error().expect("blocked");

        assert_eq!(error.error_code(), ErrorCode::NamespaceBlocked);
        assert_eq!(error.headers().correlation_id(), Some("c1"));
        assert!(provider.requested().is_empty());
    }

    #[tokio::test]
    async fn test_missing_correlation_id_is_assigned() {
        let collaborators = collaborators(
            Arc::new(MockPolicyEnforcerProvider::allowing()),
            Arc::new(MockStrategy::new()),
        )
        .with_pre_enforcer(Arc::new(PreEnforcerChain::from_config(
            &EnforcementConfig::default(),
        )));
        let (enforcer, _parent) = spawn_enforcer(collaborators);

        let authorized = enforcer
            .ask_signal(thing_signal(DittoHeaders::new()))
            .await
            .unwrap()
            .into_signal()
            .expect("authorized");

        assert!(authorized.headers().correlation_id().is_some());
    }

    #[tokio::test]
    async fn test_panicking_run_leaves_enforcer_serving() {
        let (enforcer, _parent) = spawn_enforcer(collaborators(
            Arc::new(MockPolicyEnforcerProvider::allowing()),
            Arc::new(TripwireStrategy),
        ));

        let boom = Signal::new(
            thing_id(),
            twin_types::SignalKind::Command,
            "boom",
            DittoHeaders::new().with_correlation_id("c-boom"),
        );
        let error = enforcer.ask_signal(boom).await.unwrap().into_error().expect("failed");
        assert!(error.is_internal());
        assert_eq!(error.headers().correlation_id(), Some("c-boom"));

        let outcome = enforcer
            .ask_signal(thing_signal(DittoHeaders::new().with_correlation_id("c-ok")))
            .await
            .unwrap();
        assert!(!outcome.is_rejection());
        assert!(!enforcer.is_closed());
    }

    #[tokio::test]
    async fn test_configured_timeout_rejects_stalled_run() {
        let config = EnforcementConfig::default()
            .on_current_runtime()
            .with_enforcement_timeout(Duration::from_millis(50));
        let (parent, _parent_replies) = Address::new("supervisor");
        let enforcer = EnforcementCore::from_config(
            collaborators(
                Arc::new(MockPolicyEnforcerProvider::allowing()),
                Arc::new(MockStrategy::new().authorize_with(Behaviour::Stall)),
            ),
            parent,
            &config,
        )
        .unwrap()
        .spawn();

        let error = enforcer
            .ask_signal(thing_signal(DittoHeaders::new()))
            .await
            .unwrap()
            .into_error()
            .expect("timed out");
        assert_eq!(error.error_code(), ErrorCode::EnforcementTimeout);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dedicated_pool_runs_pipelines_off_the_mailbox_runtime() {
        let strategy = Arc::new(ThreadRecordingStrategy::default());
        let (parent, _parent_replies) = Address::new("supervisor");
        let pool = EnforcementPool::dedicated(2).unwrap();
        assert!(pool.is_dedicated());
        let enforcer = EnforcementCore::new(
            collaborators(Arc::new(MockPolicyEnforcerProvider::allowing()), strategy.clone()),
            parent,
            pool,
        )
        .spawn();

        for _ in 0..3 {
            let outcome = enforcer.ask_signal(thing_signal(DittoHeaders::new())).await.unwrap();
            assert!(!outcome.is_rejection());
        }

        let threads = strategy.threads.lock().clone();
        assert_eq!(threads.len(), 3);
        assert!(threads
            .iter()
            .all(|name| name.as_deref() == Some(DISPATCHER_THREAD_NAME)));
    }

    // =============================================================================
    // RESPONSE FILTERING
    // =============================================================================

    #[tokio::test]
    async fn test_filtered_response_reaches_sender_and_parent() {
        let (enforcer, mut parent) = spawn_enforcer(collaborators(
            Arc::new(MockPolicyEnforcerProvider::allowing()),
            Arc::new(MockStrategy::new().filtered_payload(serde_json::json!({"visible": true}))),
        ));
        let (sender, mut sender_replies) = Address::new("requester");

        enforcer
            .tell(EnforcementMessage::CommandResponse {
                response: thing_response(DittoHeaders::new().with_correlation_id("c1")),
                sender: sender.clone(),
            })
            .await
            .unwrap();

        let to_sender = next_reply(&mut sender_replies).await;
        let to_parent = next_reply(&mut parent).await;

        assert!(to_sender.reply_to.is_none());
        assert_eq!(to_parent.reply_to.as_ref(), Some(&sender));
        assert_eq!(to_sender.outcome, to_parent.outcome);
        assert_eq!(to_sender.from, enforcer.id());

        let filtered = to_sender.outcome.into_response().expect("filtered");
        assert_eq!(filtered.payload(), &serde_json::json!({"visible": true}));
        assert_eq!(filtered.headers().correlation_id(), Some("c1"));
    }

    #[tokio::test]
    async fn test_unfiltered_response_is_forwarded_to_parent_only() {
        let (enforcer, mut parent) = spawn_enforcer(collaborators(
            Arc::new(MockPolicyEnforcerProvider::allowing()),
            Arc::new(MockStrategy::new().filtering(false)),
        ));
        let (sender, mut sender_replies) = Address::new("requester");
        let response = CommandResponse::new(
            thing_id(),
            ResponseKind::Modify,
            "things.responses:modifyThing",
            204,
            DittoHeaders::new().with_correlation_id("c1"),
        );

        enforcer
            .tell(EnforcementMessage::CommandResponse {
                response: response.clone(),
                sender: sender.clone(),
            })
            .await
            .unwrap();

        let forwarded = next_reply(&mut parent).await;
        assert_eq!(forwarded.outcome, Outcome::FilteredResponse(response));
        assert_eq!(forwarded.reply_to.as_ref(), Some(&sender));

        // the loop has moved on; nothing was sent to the requester
        enforcer.ask_signal(thing_signal(DittoHeaders::new())).await.unwrap();
        assert!(sender_replies.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_missing_policy_rejects_response_for_both() {
        let (enforcer, mut parent) = spawn_enforcer(collaborators(
            Arc::new(MockPolicyEnforcerProvider::absent()),
            Arc::new(MockStrategy::new()),
        ));
        let (sender, mut sender_replies) = Address::new("requester");

        enforcer
            .tell(EnforcementMessage::CommandResponse {
                response: thing_response(DittoHeaders::new()),
                sender,
            })
            .await
            .unwrap();

        let to_sender = next_reply(&mut sender_replies).await;
        let to_parent = next_reply(&mut parent).await;
        for reply in [to_sender, to_parent] {
            let error = reply.outcome.into_error().expect("rejected");
            assert_eq!(error.error_code(), ErrorCode::PolicyNotAccessible);
        }
    }

    #[tokio::test]
    async fn test_shutdown_stops_the_mailbox_loop() {
        let (enforcer, _parent) = spawn_enforcer(collaborators(
            Arc::new(MockPolicyEnforcerProvider::allowing()),
            Arc::new(MockStrategy::new()),
        ));

        enforcer.shutdown().await.unwrap();
        timeout(REPLY_WAIT, enforcer.closed()).await.expect("loop stopped");

        assert!(enforcer.ask_signal(thing_signal(DittoHeaders::new())).await.is_err());
    }
}
