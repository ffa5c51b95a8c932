use std::future::Future;

use crate::error::SyncResult;

/// A trait for types that can be started as workers.
///
/// `H` is the handle returned once the worker is spawned and `S` the state observable through
/// that handle.
pub trait Worker<H, S>
where
    H: WorkerHandle<S>,
{
    type Error;

    /// Spawns the worker and returns a handle to it.
    fn start(self) -> impl Future<Output = Result<H, Self::Error>> + Send;
}

/// A handle to a running worker.
pub trait WorkerHandle<S> {
    /// Value the worker resolves to.
    type Output;

    /// Returns the current state of the worker.
    ///
    /// The state outlives the worker, so holding it says nothing about whether the worker is still
    /// running.
    fn state(&self) -> S;

    /// Waits for the worker to complete.
    ///
    /// Fails only when the worker task itself could not run to completion, for instance because
    /// the runtime shut down.
    fn wait(self) -> impl Future<Output = SyncResult<Self::Output>> + Send;
}
