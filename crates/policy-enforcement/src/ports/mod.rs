//! Ports: the traits the pipelines are written against.

pub mod outbound;

pub use outbound::{
    EnforcementHooks, EnforcementStrategy, PolicyEnforcerLoader, PolicyEnforcerProvider,
    PolicyIdResolver, PreEnforcer,
};
