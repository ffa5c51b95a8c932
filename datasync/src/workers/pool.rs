use std::collections::HashMap;
use std::mem;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::join_all;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

use crate::error::SyncResult;
use crate::workers::base::{Worker, WorkerHandle};
use crate::workers::slice::{SliceReport, SliceWorker, SliceWorkerHandle};

/// Internal state for [`SliceWorkerPool`].
#[derive(Debug)]
pub struct SliceWorkerPoolInner {
    /// Slices that did not report back yet, indexed by slice index.
    active: HashMap<usize, SliceWorkerHandle>,
    /// Slices that reached a terminal state.
    finished: Vec<SliceWorkerHandle>,
    pool_update: Arc<Notify>,
}

impl SliceWorkerPoolInner {
    fn new(pool_update: Arc<Notify>) -> Self {
        Self {
            active: HashMap::new(),
            finished: Vec::new(),
            pool_update,
        }
    }

    /// Spawns a slice worker and tracks it as active.
    ///
    /// Returns `Ok(false)` without starting anything when a worker for the same slice exists.
    pub async fn start_worker(&mut self, worker: SliceWorker) -> SyncResult<bool> {
        let slice_index = worker.slice_index();
        if self.active.contains_key(&slice_index) {
            warn!("worker for slice {slice_index} already exists in the pool");
            return Ok(false);
        }

        let handle = worker.start().await?;
        self.active.insert(slice_index, handle);

        debug!("added worker for slice {slice_index} to the pool");

        Ok(true)
    }

    /// Moves a worker from the active to the finished set and wakes up waiters.
    pub fn mark_worker_finished(&mut self, slice_index: usize) {
        let removed_worker = self.active.remove(&slice_index);

        self.pool_update.notify_waiters();

        if let Some(removed_worker) = removed_worker {
            self.finished.push(removed_worker);
        }
    }

    /// Collects the reports of every finished worker, or returns `None` while workers are still
    /// active.
    async fn collect(&mut self) -> Option<Vec<SliceReport>> {
        // Waiting on active workers here would deadlock, since they need this lock to report
        // themselves as finished.
        if !self.active.is_empty() {
            return None;
        }

        let mut reports = join_all(mem::take(&mut self.finished).into_iter().map(
            |worker| async move {
                let state = worker.state();
                match worker.wait().await {
                    Ok(report) => report,
                    Err(err) => SliceReport::lost(&state, err),
                }
            },
        ))
        .await;
        reports.sort_by_key(|report| report.slice_index);

        Some(reports)
    }
}

/// Pool tracking the slice workers of a job.
///
/// Besides the workers, the pool carries the halt flag: once raised, pending slices end as
/// cancelled instead of starting.
#[derive(Debug, Clone)]
pub struct SliceWorkerPool {
    inner: Arc<Mutex<SliceWorkerPoolInner>>,
    pool_update: Arc<Notify>,
    halted: Arc<AtomicBool>,
}

impl SliceWorkerPool {
    pub fn new() -> Self {
        let pool_update = Arc::new(Notify::new());

        Self {
            inner: Arc::new(Mutex::new(SliceWorkerPoolInner::new(pool_update.clone()))),
            pool_update,
            halted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Prevents every slice that did not start yet from starting.
    pub fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Waits until every worker of the pool finished and returns their reports ordered by slice
    /// index.
    pub async fn wait_all(&self) -> Vec<SliceReport> {
        loop {
            // Registering for the notification before checking the pool makes sure a worker
            // finishing in between is not missed.
            let notified = self.pool_update.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut workers = self.inner.lock().await;
                if let Some(reports) = workers.collect().await {
                    return reports;
                }
            }

            notified.await;
        }
    }
}

impl Default for SliceWorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for SliceWorkerPool {
    type Target = Mutex<SliceWorkerPoolInner>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
