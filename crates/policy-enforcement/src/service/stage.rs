//! Running one collaborator call as an isolated pipeline stage.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};

use futures::FutureExt;

use crate::error::{panic_message, StageError, StageResult};

/// Run `start` and await the future it returns.
///
/// A panic while starting the stage or while polling it becomes an
/// unexpected `StageError`, so it short-circuits the pipeline like any other
/// failure instead of taking down the task.
pub(crate) async fn guarded<T, F, Fut>(stage: &'static str, start: F) -> StageResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = StageResult<T>>,
{
    let future = match panic::catch_unwind(AssertUnwindSafe(start)) {
        Ok(future) => future,
        Err(payload) => return Err(panicked(stage, payload.as_ref())),
    };
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(panicked(stage, payload.as_ref())),
    }
}

fn panicked(stage: &'static str, payload: &(dyn std::any::Any + Send)) -> StageError {
    StageError::Unexpected(anyhow::anyhow!(
        "{stage} panicked: {}",
        panic_message(payload)
    ))
}
