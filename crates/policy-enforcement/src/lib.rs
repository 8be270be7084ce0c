//! # Policy Enforcement
//!
//! Per-entity enforcement of signals and command responses against the
//! entity's policy.
//!
//! ## Architecture
//!
//! This crate follows Hexagonal Architecture (Ports & Adapters):
//!
//! - **Domain Layer** (`domain/`): Pure values, no I/O
//!   - `PolicyEnforcer`: Loaded policy with its permission checker
//!   - `Outcome`: Authorized signal, filtered response or rejection
//!   - `EnforcementConfig`: Configuration with validation
//!
//! - **Ports Layer** (`ports/`): Trait definitions
//!   - `PreEnforcer`, `PolicyIdResolver`, `PolicyEnforcerProvider`
//!   - `EnforcementStrategy`: Entity-type specific authorization and filtering
//!   - `EnforcementHooks`: Validation and enrichment
//!
//! - **Service Layer** (`service/`): The two pipelines
//!   - `authorize`: pre-enforce, resolve, load, authorize, validate, enrich
//!   - `filter`: resolve, load, filter, validate
//!
//! - **Actor Layer** (`actor/`): One mailbox loop per entity
//!   - `EnforcementCore`: Dispatches messages, never blocks on a pipeline
//!   - `EnforcementPool`: Where pipelines run
//!
//! - **Adapters Layer** (`adapters/`): Ready-made collaborators
//!   - `CachingPolicyEnforcerProvider`: LRU cache in front of a loader
//!   - `PreEnforcerChain`: Correlation id and namespace blocking
//!
//! - **Policies** (`policies/`): Strategy and resolver for policy entities
//!
//! ## Invariants
//!
//! - Every signal or response handled yields exactly one reply.
//! - Each pipeline run finishes its span exactly once.
//! - A failing or panicking run never takes the enforcer down.
//! - A reply that authorizes a signal carries the caller's trace-parent.
//!
//! ## Usage Example
//!
//! ```ignore
//! use policy_enforcement::{
//!     Address, CachingPolicyEnforcerProvider, EnforcementCollaborators, EnforcementConfig,
//!     EnforcementCore,
//! };
//! use policy_enforcement::policies::{PolicyCommandEnforcement, PolicySignalPolicyIdResolver};
//! use std::sync::Arc;
//!
//! let config = EnforcementConfig::from_env()?;
//! let provider = CachingPolicyEnforcerProvider::from_config(loader, &config)?;
//! let collaborators = EnforcementCollaborators::new(
//!     Arc::new(PolicySignalPolicyIdResolver),
//!     Arc::new(provider),
//!     Arc::new(PolicyCommandEnforcement),
//! );
//!
//! let (parent, mut parent_replies) = Address::new("policy-supervisor");
//! let enforcer = EnforcementCore::from_config(collaborators, parent, &config)?.spawn();
//!
//! let outcome = enforcer.ask_signal(signal).await?;
//! ```

pub mod actor;
pub mod adapters;
pub mod domain;
pub mod error;
pub mod policies;
pub mod ports;
pub mod service;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use actor::{
    Address, AddressId, AdminCommand, EnforcementCore, EnforcementMessage, EnforcementPool,
    EnforcerHandle, Reply, LOCAL_ASK_TIMEOUT,
};
pub use adapters::{
    BlockedNamespacesPreEnforcer, CachingPolicyEnforcerProvider, CorrelationIdPreEnforcer,
    DefaultHooks, ExtraFieldsEnricher, NoOpPreEnforcer, PreEnforcerChain,
};
pub use domain::{EnforcementConfig, Enforcer, Outcome, Permission, PolicyEnforcer, ResourceKey};
pub use error::{classify, AskError, ConfigError, PoolError, StageError, StageResult};
pub use ports::{
    EnforcementHooks, EnforcementStrategy, PolicyEnforcerLoader, PolicyEnforcerProvider,
    PolicyIdResolver, PreEnforcer,
};
pub use service::{authorize, filter, filter_if_needed, EnforcementCollaborators, Filtering};
