//! Service layer: the authorization and response-filtering pipelines.
//!
//! Pipelines are plain async functions over [`EnforcementCollaborators`].
//! They hold no state besides what one run creates (traced signal, span,
//! headers), so any number of runs may be in flight at once.

pub mod authorization;
pub mod collaborators;
pub mod filtering;
pub(crate) mod stage;

pub use authorization::authorize;
pub use collaborators::EnforcementCollaborators;
pub use filtering::{filter, filter_if_needed, needs_filtering, Filtering};
