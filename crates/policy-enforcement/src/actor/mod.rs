//! Actor layer: the per-entity mailbox loop, its handle and the pool
//! pipelines run on.

pub mod enforcement_core;
pub mod handle;
pub mod messages;
pub mod pool;

pub use enforcement_core::EnforcementCore;
pub use handle::{EnforcerHandle, LOCAL_ASK_TIMEOUT};
pub use messages::{Address, AddressId, AdminCommand, EnforcementMessage, Reply};
pub use pool::{EnforcementPool, DISPATCHER_THREAD_NAME};
