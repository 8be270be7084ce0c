//! # Policy Flows
//!
//! Policy entities enforced end to end: the policy strategy and resolver
//! behind a caching provider, driven through a spawned enforcer.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::timeout;

    use policy_enforcement::policies::{
        signal_types, PolicyCommandEnforcement, PolicySignalPolicyIdResolver,
    };
    use policy_enforcement::test_utils::StaticEnforcer;
    use policy_enforcement::{
        Address, CachingPolicyEnforcerProvider, EnforcementCollaborators, EnforcementCore,
        EnforcementMessage, EnforcementPool, EnforcerHandle, PolicyEnforcer, PolicyEnforcerLoader,
        Reply, StageResult,
    };
    use twin_types::{
        CommandResponse, DittoHeaders, EntityId, EntityType, ErrorCode, PolicyId, ResponseKind,
        Signal, SignalKind,
    };

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    /// Policy store held in memory, counting loads.
    #[derive(Default)]
    struct InMemoryPolicyStore {
        policies: HashMap<PolicyId, PolicyEnforcer>,
        loads: Arc<AtomicUsize>,
    }

    impl InMemoryPolicyStore {
        fn with(mut self, name: &str, enforcer: StaticEnforcer) -> Self {
            let policy_id = PolicyId::new("ns", name);
            self.policies
                .insert(policy_id.clone(), PolicyEnforcer::new(policy_id, 1, Arc::new(enforcer)));
            self
        }
    }

    #[async_trait]
    impl PolicyEnforcerLoader for InMemoryPolicyStore {
        async fn load(&self, policy_id: &PolicyId) -> StageResult<Option<PolicyEnforcer>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(self.policies.get(policy_id).cloned())
        }
    }

    type Provider = CachingPolicyEnforcerProvider<InMemoryPolicyStore>;

    /// Caching provider in front of `store`, plus the store's load counter.
    fn provider(store: InMemoryPolicyStore) -> (Arc<Provider>, Arc<AtomicUsize>) {
        let loads = store.loads.clone();
        let provider = CachingPolicyEnforcerProvider::new(
            store,
            NonZeroUsize::new(16).unwrap(),
            Duration::from_secs(60),
        );
        (Arc::new(provider), loads)
    }

    fn spawn_policy_enforcer(provider: Arc<Provider>) -> (EnforcerHandle, UnboundedReceiver<Reply>) {
        let (parent, parent_replies) = Address::new("policy-supervisor");
        let collaborators = EnforcementCollaborators::new(
            Arc::new(PolicySignalPolicyIdResolver),
            provider,
            Arc::new(PolicyCommandEnforcement),
        );
        let pool = EnforcementPool::current().unwrap();
        let handle = EnforcementCore::new(collaborators, parent, pool).spawn();
        (handle, parent_replies)
    }

    fn alice() -> DittoHeaders {
        DittoHeaders::new()
            .with_correlation_id("c1")
            .with_authorization_subjects(["user:alice"])
    }

    fn policy_signal(name: &str, kind: SignalKind, signal_type: &str) -> Signal {
        Signal::new(EntityId::new(EntityType::Policy, "ns", name), kind, signal_type, alice())
            .with_resource_path("/entries/owner")
            .with_payload(json!({"subjects": {"user:alice": {}}}))
    }

    // =============================================================================
    // FLOWS
    // =============================================================================

    #[tokio::test]
    async fn test_owner_modifies_policy_and_enforcer_is_cached() {
        let (provider, loads) = provider(InMemoryPolicyStore::default().with("p1", StaticEnforcer::allow_all()));
        let (enforcer, _parent) = spawn_policy_enforcer(provider);

        for _ in 0..2 {
            let outcome = enforcer
                .ask_signal(policy_signal("p1", SignalKind::Command, signal_types::MODIFY_POLICY))
                .await
                .unwrap();
            let authorized = outcome.into_signal().expect("authorized");
            assert_eq!(authorized.headers().correlation_id(), Some("c1"));
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reader_may_retrieve_but_not_modify() {
        let (provider, _) = provider(InMemoryPolicyStore::default().with("p1", StaticEnforcer::read_only()));
        let (enforcer, _parent) = spawn_policy_enforcer(provider);

        let query = enforcer
            .ask_signal(policy_signal("p1", SignalKind::Query, signal_types::RETRIEVE_POLICY))
            .await
            .unwrap();
        assert!(!query.is_rejection());

        let error = enforcer
            .ask_signal(policy_signal("p1", SignalKind::Command, signal_types::DELETE_POLICY))
            .await
            .unwrap()
            .into_error()
            .expect("refused");
        assert_eq!(error.error_code(), ErrorCode::SignalNotAuthorized);
        assert_eq!(error.headers().correlation_id(), Some("c1"));
    }

    #[tokio::test]
    async fn test_missing_policy_allows_only_creation() {
        let (provider, loads) = provider(InMemoryPolicyStore::default());
        let (enforcer, _parent) = spawn_policy_enforcer(provider);

        let created = enforcer
            .ask_signal(policy_signal("new", SignalKind::Command, signal_types::CREATE_POLICY))
            .await
            .unwrap();
        assert!(!created.is_rejection());

        let error = enforcer
            .ask_signal(policy_signal("new", SignalKind::Command, signal_types::MODIFY_POLICY))
            .await
            .unwrap()
            .into_error()
            .expect("refused");
        assert_eq!(error.error_code(), ErrorCode::PolicyNotAccessible);

        // absence is cached as well
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidated_policy_is_reloaded() {
        let (provider, loads) = provider(InMemoryPolicyStore::default().with("p1", StaticEnforcer::allow_all()));
        let (enforcer, _parent) = spawn_policy_enforcer(provider.clone());
        let modify = || policy_signal("p1", SignalKind::Command, signal_types::MODIFY_POLICY);

        enforcer.ask_signal(modify()).await.unwrap();
        provider.invalidate(&PolicyId::new("ns", "p1"));
        enforcer.ask_signal(modify()).await.unwrap();

        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_thing_signal_is_refused_by_policy_enforcer() {
        let (provider, loads) = provider(InMemoryPolicyStore::default());
        let (enforcer, _parent) = spawn_policy_enforcer(provider);
        let signal = Signal::new(
            EntityId::new(EntityType::Thing, "ns", "lamp"),
            SignalKind::Command,
            "things.commands:modifyThing",
            alice(),
        );

        let error = enforcer.ask_signal(signal).await.unwrap().into_error().expect("refused");

        assert_eq!(error.error_code(), ErrorCode::ValidationFailed);
        assert_eq!(loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_retrieve_response_is_reduced_to_readable_fields() {
        let (provider, _) = provider(
            InMemoryPolicyStore::default()
                .with("p1", StaticEnforcer::read_only().with_visible_fields(["entries"])),
        );
        let (enforcer, _parent) = spawn_policy_enforcer(provider);
        let (sender, mut replies) = Address::new("requester");
        let response = CommandResponse::new(
            EntityId::new(EntityType::Policy, "ns", "p1"),
            ResponseKind::Query,
            "policies.responses:retrievePolicy",
            200,
            alice(),
        )
        .with_payload(json!({"entries": {"owner": {}}, "imports": {"shared": {}}}));

        enforcer
            .tell(EnforcementMessage::CommandResponse { response, sender })
            .await
            .unwrap();

        let reply = timeout(Duration::from_secs(2), replies.recv())
            .await
            .expect("reply in time")
            .expect("channel open");
        let filtered = reply.outcome.into_response().expect("filtered");
        assert_eq!(filtered.payload(), &json!({"entries": {"owner": {}}}));
        assert_eq!(filtered.status(), 200);
    }
}
