//! Adapters: ready-made collaborator implementations.

pub mod caching_provider;
pub mod hooks;
pub mod pre_enforcers;

pub use caching_provider::CachingPolicyEnforcerProvider;
pub use hooks::{DefaultHooks, ExtraFieldsEnricher};
pub use pre_enforcers::{
    BlockedNamespacesPreEnforcer, CorrelationIdPreEnforcer, NoOpPreEnforcer, PreEnforcerChain,
};
