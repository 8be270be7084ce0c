//! # Twin Types Crate
//!
//! Values that flow through the per-entity enforcement pipeline.
//!
//! ## Design Principles
//!
//! - **Immutable values**: `Signal` and `CommandResponse` are never mutated in
//!   place; every `with_*` method returns a new value.
//! - **Headers travel with the value**: correlation id, trace-parent and
//!   authorization subjects live in the `DittoHeaders` bag.
//! - **Absence is not an error**: a missing policy enforcer is an `Option`,
//!   failures are `EnforcementError`s that always carry the in-flight headers.

pub mod entities;
pub mod errors;
pub mod headers;
pub mod signal;

pub use entities::{EntityId, EntityType, IdError, PolicyId};
pub use errors::{EnforcementError, ErrorCode};
pub use headers::DittoHeaders;
pub use signal::{CommandResponse, ResponseKind, Signal, SignalKind};
