//! The collaborators one entity type plugs into the pipelines.

use std::fmt;
use std::sync::Arc;

use twin_telemetry::{DefaultTracer, Tracer};

use crate::adapters::{DefaultHooks, NoOpPreEnforcer};
use crate::ports::{
    EnforcementHooks, EnforcementStrategy, PolicyEnforcerProvider, PolicyIdResolver, PreEnforcer,
};

/// Everything a pipeline run needs besides its message.
///
/// Cheap to clone; each run gets its own copy.
#[derive(Clone)]
pub struct EnforcementCollaborators {
    pub pre_enforcer: Arc<dyn PreEnforcer>,
    pub resolver: Arc<dyn PolicyIdResolver>,
    pub provider: Arc<dyn PolicyEnforcerProvider>,
    pub strategy: Arc<dyn EnforcementStrategy>,
    pub hooks: Arc<dyn EnforcementHooks>,
    pub tracer: Arc<dyn Tracer>,
}

impl EnforcementCollaborators {
    /// Collaborators with a pass-through pre-enforcer, identity hooks and
    /// the default tracer.
    pub fn new(
        resolver: Arc<dyn PolicyIdResolver>,
        provider: Arc<dyn PolicyEnforcerProvider>,
        strategy: Arc<dyn EnforcementStrategy>,
    ) -> Self {
        Self {
            pre_enforcer: Arc::new(NoOpPreEnforcer),
            resolver,
            provider,
            strategy,
            hooks: Arc::new(DefaultHooks),
            tracer: Arc::new(DefaultTracer::new()),
        }
    }

    pub fn with_pre_enforcer(mut self, pre_enforcer: Arc<dyn PreEnforcer>) -> Self {
        self.pre_enforcer = pre_enforcer;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn EnforcementHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }
}

impl fmt::Debug for EnforcementCollaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnforcementCollaborators").finish_non_exhaustive()
    }
}
