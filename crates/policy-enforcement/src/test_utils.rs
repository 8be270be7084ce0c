//! Mock collaborators and fixtures.
//!
//! Available with the `test-utils` feature flag.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use twin_types::{
    CommandResponse, DittoHeaders, EnforcementError, EntityId, EntityType, PolicyId, ResponseKind,
    Signal, SignalKind,
};

use crate::domain::{Enforcer, Permission, PolicyEnforcer, ResourceKey};
use crate::error::StageResult;
use crate::ports::{
    EnforcementHooks, EnforcementStrategy, PolicyEnforcerProvider, PolicyIdResolver, PreEnforcer,
};

// =============================================================================
// FIXTURES
// =============================================================================

pub fn thing_id() -> EntityId {
    EntityId::new(EntityType::Thing, "ns", "lamp")
}

pub fn thing_policy_id() -> PolicyId {
    thing_id().to_policy_id()
}

pub fn signal_for(entity_id: EntityId, headers: DittoHeaders) -> Signal {
    Signal::new(entity_id, SignalKind::Command, "things.commands:modifyThing", headers)
        .with_resource_path("/attributes/on")
        .with_payload(json!(true))
}

pub fn thing_signal(headers: DittoHeaders) -> Signal {
    signal_for(thing_id(), headers)
}

pub fn thing_response(headers: DittoHeaders) -> CommandResponse {
    CommandResponse::new(
        thing_id(),
        ResponseKind::Query,
        "things.responses:retrieveThing",
        200,
        headers,
    )
    .with_payload(json!({"attributes": {"on": true}, "features": {"secret": 42}}))
}

// =============================================================================
// ENFORCER
// =============================================================================

/// Enforcer with fixed answers.
#[derive(Debug, Clone, Default)]
pub struct StaticEnforcer {
    readable: bool,
    writable: bool,
    visible_fields: Option<Vec<String>>,
    subject: Option<String>,
}

impl StaticEnforcer {
    pub fn allow_all() -> Self {
        Self {
            readable: true,
            writable: true,
            ..Default::default()
        }
    }

    pub fn read_only() -> Self {
        Self {
            readable: true,
            ..Default::default()
        }
    }

    pub fn deny_all() -> Self {
        Self::default()
    }

    /// Restrict reads to these top-level fields.
    pub fn with_visible_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.visible_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Grant only to requests carrying `subject`.
    pub fn for_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    fn applies_to(&self, subjects: &[String]) -> bool {
        match &self.subject {
            Some(subject) => subjects.iter().any(|s| s == subject),
            None => true,
        }
    }

    fn grants(&self, subjects: &[String], permission: Permission) -> bool {
        let granted = match permission {
            Permission::Read => self.readable,
            Permission::Write => self.writable,
        };
        granted && self.applies_to(subjects)
    }
}

impl Enforcer for StaticEnforcer {
    fn has_unrestricted_permissions(&self, _: &ResourceKey, subjects: &[String], permission: Permission) -> bool {
        let restricted = permission == Permission::Read && self.visible_fields.is_some();
        self.grants(subjects, permission) && !restricted
    }

    fn has_partial_permissions(&self, _: &ResourceKey, subjects: &[String], permission: Permission) -> bool {
        self.grants(subjects, permission)
    }

    fn filter_fields(&self, _: &ResourceKey, value: &Value, subjects: &[String], permission: Permission) -> Value {
        if !self.grants(subjects, permission) {
            return Value::Object(Map::new());
        }
        match (&self.visible_fields, value) {
            (Some(fields), Value::Object(object)) => Value::Object(
                object
                    .iter()
                    .filter(|(key, _)| fields.contains(key))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect(),
            ),
            _ => value.clone(),
        }
    }
}

// =============================================================================
// COLLABORATORS
// =============================================================================

/// How a mocked stage behaves.
#[derive(Debug, Clone, Copy, Default)]
pub enum Behaviour {
    /// Succeed with the input.
    #[default]
    Pass,
    /// Fail with a domain error.
    Reject,
    /// Fail with an unexpected error.
    Fail(&'static str),
    Panic(&'static str),
    /// Never complete.
    Stall,
}

async fn act<T>(behaviour: Behaviour, value: T, rejection: EnforcementError) -> StageResult<T> {
    match behaviour {
        Behaviour::Pass => Ok(value),
        Behaviour::Reject => Err(rejection.into()),
        Behaviour::Fail(message) => Err(anyhow::Error::msg(message).into()),
        Behaviour::Panic(message) => panic!("{message}"),
        Behaviour::Stall => std::future::pending().await,
    }
}

/// The entity's own id names its policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntityPolicyIdResolver;

#[async_trait]
impl PolicyIdResolver for EntityPolicyIdResolver {
    async fn resolve_for_signal(&self, signal: &Signal) -> StageResult<PolicyId> {
        Ok(signal.entity_id().to_policy_id())
    }

    async fn resolve_for_response(&self, response: &CommandResponse) -> StageResult<PolicyId> {
        Ok(response.entity_id().to_policy_id())
    }
}

#[derive(Debug, Default)]
pub struct MockPreEnforcer {
    behaviour: Behaviour,
}

impl MockPreEnforcer {
    pub fn new(behaviour: Behaviour) -> Self {
        Self { behaviour }
    }
}

#[async_trait]
impl PreEnforcer for MockPreEnforcer {
    async fn pre_enforce(&self, signal: Signal) -> StageResult<Signal> {
        let rejection = EnforcementError::NamespaceBlocked {
            namespace: signal.entity_id().namespace().to_string(),
            headers: signal.headers().clone(),
        };
        act(self.behaviour, signal, rejection).await
    }
}

/// Provider answering every lookup with the same enforcer (or none).
pub struct MockPolicyEnforcerProvider {
    enforcer: Option<Arc<dyn Enforcer>>,
    delays: HashMap<PolicyId, Duration>,
    requested: Mutex<Vec<PolicyId>>,
}

impl MockPolicyEnforcerProvider {
    pub fn with_enforcer(enforcer: impl Enforcer + 'static) -> Self {
        Self {
            enforcer: Some(Arc::new(enforcer)),
            delays: HashMap::new(),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn allowing() -> Self {
        Self::with_enforcer(StaticEnforcer::allow_all())
    }

    /// Every policy is missing.
    pub fn absent() -> Self {
        Self {
            enforcer: None,
            delays: HashMap::new(),
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Delay lookups of `policy_id`.
    pub fn with_delay(mut self, policy_id: PolicyId, delay: Duration) -> Self {
        self.delays.insert(policy_id, delay);
        self
    }

    /// Policy ids looked up so far, in order.
    pub fn requested(&self) -> Vec<PolicyId> {
        self.requested.lock().clone()
    }
}

#[async_trait]
impl PolicyEnforcerProvider for MockPolicyEnforcerProvider {
    async fn get_policy_enforcer(&self, policy_id: &PolicyId) -> StageResult<Option<PolicyEnforcer>> {
        self.requested.lock().push(policy_id.clone());
        if let Some(delay) = self.delays.get(policy_id) {
            tokio::time::sleep(*delay).await;
        }
        Ok(self
            .enforcer
            .as_ref()
            .map(|enforcer| PolicyEnforcer::new(policy_id.clone(), 1, enforcer.clone())))
    }
}

/// Strategy recording its calls.
#[derive(Default)]
pub struct MockStrategy {
    authorize: Behaviour,
    filter: Behaviour,
    skip_filtering: bool,
    panic_on_should_filter: bool,
    filtered_payload: Option<Value>,
    calls: Mutex<Vec<&'static str>>,
    last_signal: Mutex<Option<Signal>>,
}

impl MockStrategy {
    /// Authorizes everything and filters every response unchanged.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn authorize_with(mut self, behaviour: Behaviour) -> Self {
        self.authorize = behaviour;
        self
    }

    pub fn filter_with(mut self, behaviour: Behaviour) -> Self {
        self.filter = behaviour;
        self
    }

    /// Whether responses need filtering at all.
    pub fn filtering(mut self, enabled: bool) -> Self {
        self.skip_filtering = !enabled;
        self
    }

    /// Replace the payload of filtered responses.
    pub fn filtered_payload(mut self, payload: Value) -> Self {
        self.filtered_payload = Some(payload);
        self
    }

    pub fn panic_on_should_filter(mut self) -> Self {
        self.panic_on_should_filter = true;
        self
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    /// The signal most recently handed to an authorize method.
    pub fn last_signal(&self) -> Option<Signal> {
        self.last_signal.lock().clone()
    }

    fn record(&self, call: &'static str, signal: Option<&Signal>) {
        self.calls.lock().push(call);
        if let Some(signal) = signal {
            *self.last_signal.lock() = Some(signal.clone());
        }
    }

    fn not_authorized(signal: &Signal) -> EnforcementError {
        EnforcementError::SignalNotAuthorized {
            entity_id: signal.entity_id().clone(),
            signal_type: signal.signal_type().to_string(),
            headers: signal.headers().clone(),
        }
    }
}

#[async_trait]
impl EnforcementStrategy for MockStrategy {
    async fn authorize_signal(&self, signal: Signal, _enforcer: &PolicyEnforcer) -> StageResult<Signal> {
        self.record("authorize_signal", Some(&signal));
        let rejection = Self::not_authorized(&signal);
        act(self.authorize, signal, rejection).await
    }

    async fn authorize_signal_with_missing_enforcer(&self, signal: Signal) -> StageResult<Signal> {
        self.record("authorize_signal_with_missing_enforcer", Some(&signal));
        let rejection = Self::not_authorized(&signal);
        act(self.authorize, signal, rejection).await
    }

    fn should_filter_command_response(&self, _response: &CommandResponse) -> bool {
        if self.panic_on_should_filter {
            panic!("should_filter_command_response exploded");
        }
        !self.skip_filtering
    }

    async fn filter_response(
        &self,
        response: CommandResponse,
        _enforcer: &PolicyEnforcer,
    ) -> StageResult<CommandResponse> {
        self.record("filter_response", None);
        let response = match &self.filtered_payload {
            Some(payload) => response.with_payload(payload.clone()),
            None => response,
        };
        let rejection = EnforcementError::SignalNotAuthorized {
            entity_id: response.entity_id().clone(),
            signal_type: response.response_type().to_string(),
            headers: response.headers().clone(),
        };
        act(self.filter, response, rejection).await
    }
}

/// Hooks refusing every signal and response as invalid.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectingValidator;

#[async_trait]
impl EnforcementHooks for RejectingValidator {
    async fn validate_signal(&self, signal: Signal) -> StageResult<Signal> {
        Err(EnforcementError::ValidationFailed {
            description: "signal does not match the thing model".to_string(),
            headers: signal.headers().clone(),
        }
        .into())
    }

    async fn validate_response(&self, response: CommandResponse) -> StageResult<CommandResponse> {
        Err(EnforcementError::ValidationFailed {
            description: "response does not match the thing model".to_string(),
            headers: response.headers().clone(),
        }
        .into())
    }
}
