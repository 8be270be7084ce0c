//! Where pipeline runs execute.

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::info;

use crate::domain::EnforcementConfig;
use crate::error::PoolError;

/// Name of the dedicated pool's worker threads.
pub const DISPATCHER_THREAD_NAME: &str = "enforcement-dispatcher";

struct OwnedRuntime(Option<Runtime>);

impl Drop for OwnedRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            // may be dropped from within async code
            runtime.shutdown_background();
        }
    }
}

/// Runtime that executes pipelines, decoupled from the mailbox loop.
///
/// Either a handle to an existing runtime or a dedicated multi-threaded one.
/// A dedicated runtime shuts down once the last clone is dropped; runs still
/// in flight at that point are abandoned.
#[derive(Clone)]
pub struct EnforcementPool {
    handle: Handle,
    owned: Option<Arc<OwnedRuntime>>,
}

impl EnforcementPool {
    /// Run pipelines on the runtime of the calling thread.
    pub fn current() -> Result<Self, PoolError> {
        let handle = Handle::try_current().map_err(|_| PoolError::NoRuntime)?;
        Ok(Self {
            handle,
            owned: None,
        })
    }

    /// Run pipelines on a dedicated runtime with `workers` threads.
    pub fn dedicated(workers: usize) -> Result<Self, PoolError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(workers.max(1))
            .thread_name(DISPATCHER_THREAD_NAME)
            .enable_all()
            .build()?;
        info!(workers, "Started dedicated enforcement pool");
        Ok(Self {
            handle: runtime.handle().clone(),
            owned: Some(Arc::new(OwnedRuntime(Some(runtime)))),
        })
    }

    pub fn from_config(config: &EnforcementConfig) -> Result<Self, PoolError> {
        config.validate()?;
        match config.pool_size {
            Some(workers) => Self::dedicated(workers),
            None => Self::current(),
        }
    }

    pub fn is_dedicated(&self) -> bool {
        self.owned.is_some()
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }
}
