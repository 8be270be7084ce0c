//! Domain layer: enforcer capability, outcomes and configuration. No I/O.

pub mod config;
pub mod enforcer;
pub mod outcome;

pub use config::EnforcementConfig;
pub use enforcer::{Enforcer, Permission, PolicyEnforcer, ResourceKey};
pub use outcome::Outcome;
