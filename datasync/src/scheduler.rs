//! Scheduling of the slices of a job into task groups.

use std::collections::BTreeMap;
use std::sync::Arc;

use datasync_config::shared::{ErrorLimitConfig, JobConfig};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use crate::config::Configuration;
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::metrics::register_metrics;
use crate::perf::{PerfReport, PerfTrace, ReportScope};
use crate::plugin::{DirtyRecordStats, PluginRegistry};
use crate::workers::pool::SliceWorkerPool;
use crate::workers::slice::{SliceReport, SliceSpec, SliceStatus, SliceWorker};
use crate::{bail, sync_error};

/// Reader and writer configurations of one slice, before scheduling.
#[derive(Debug, Clone)]
pub struct SliceConfig {
    pub reader_name: String,
    pub reader: Configuration,
    pub writer_name: String,
    pub writer: Configuration,
}

/// Outcome of a job.
///
/// Holds one report per slice, ordered by slice index, and the performance summary, which is
/// available whatever the outcome of the slices.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub job_id: u64,
    pub slices: Vec<SliceReport>,
    pub perf_summary: String,
    pub perf_report: PerfReport,
}

impl JobResult {
    fn count(&self, status: SliceStatus) -> usize {
        self.slices
            .iter()
            .filter(|slice| slice.status == status)
            .count()
    }

    pub fn succeeded_count(&self) -> usize {
        self.count(SliceStatus::Succeeded)
    }

    pub fn failed_count(&self) -> usize {
        self.count(SliceStatus::Failed)
    }

    pub fn cancelled_count(&self) -> usize {
        self.count(SliceStatus::Cancelled)
    }

    pub fn is_success(&self) -> bool {
        self.slices.iter().all(SliceReport::is_success)
    }

    pub fn records_read(&self) -> u64 {
        self.slices.iter().map(SliceReport::records_read).sum()
    }

    pub fn records_written(&self) -> u64 {
        self.slices.iter().map(SliceReport::records_written).sum()
    }

    /// Dirty record counters summed over every slice.
    pub fn dirty(&self) -> DirtyRecordStats {
        let mut dirty = DirtyRecordStats::default();
        for slice in &self.slices {
            dirty.merge(&slice.dirty);
        }

        dirty
    }

    /// Reports grouped by task group.
    pub fn task_groups(&self) -> BTreeMap<u32, Vec<&SliceReport>> {
        let mut groups: BTreeMap<u32, Vec<&SliceReport>> = BTreeMap::new();
        for slice in &self.slices {
            groups.entry(slice.task_group_id).or_default().push(slice);
        }

        groups
    }

    /// Returns the composite error of every slice that did not succeed, if any.
    pub fn error(&self) -> Option<SyncError> {
        let errors: Vec<SyncError> = self
            .slices
            .iter()
            .filter_map(|slice| match slice.status {
                SliceStatus::Cancelled => Some(sync_error!(
                    ErrorKind::SliceCancelled,
                    "Slice was not started",
                    format!(
                        "slice {} (task group {}, task {})",
                        slice.slice_index, slice.task_group_id, slice.task_id
                    )
                )),
                _ => slice.error(),
            })
            .collect();

        if errors.is_empty() {
            return None;
        }

        Some(SyncError::many(errors))
    }

    /// Turns the result into an error when a slice did not succeed.
    pub fn into_result(self) -> SyncResult<JobResult> {
        match self.error() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }

    /// Checks the dirty records of the job against `limit`.
    ///
    /// A record limit takes precedence over a percentage limit. The percentage is computed over
    /// every record the readers handled, dirty ones included.
    pub fn check_dirty_limit(&self, limit: &ErrorLimitConfig) -> SyncResult<()> {
        let dirty = self.dirty();

        if let Some(max_records) = limit.records {
            if dirty.total_records() > max_records {
                bail!(
                    ErrorKind::DirtyRecordLimitExceeded,
                    "The number of dirty records exceeds the limit",
                    format!(
                        "limit is {max_records} records, {} were captured",
                        dirty.total_records()
                    )
                );
            }

            return Ok(());
        }

        if let Some(max_percentage) = limit.percentage {
            let total = self.records_read() + dirty.reader_records;
            if total == 0 {
                return Ok(());
            }

            let percentage = dirty.total_records() as f64 / total as f64;
            if percentage > max_percentage {
                bail!(
                    ErrorKind::DirtyRecordLimitExceeded,
                    "The share of dirty records exceeds the limit",
                    format!("limit is {max_percentage}, {percentage:.4} was captured")
                );
            }
        }

        Ok(())
    }
}

/// Returns the task group of every slice: `ceil(slice_count / slices_per_group)` groups filled
/// round robin.
pub fn assign_task_groups(slice_count: usize, slices_per_group: usize) -> Vec<u32> {
    let groups = slice_count.div_ceil(slices_per_group.max(1)).max(1);

    (0..slice_count).map(|index| (index % groups) as u32).collect()
}

/// Runs the slices of a job, at most `scheduler.concurrency` of them at once.
///
/// A failing slice does not stop its siblings. After a configuration error no new slice
/// starts, and with `abort_on_first_failure` the first failure also cancels the running
/// slices.
#[derive(Debug)]
pub struct Scheduler {
    config: Arc<JobConfig>,
    registry: Arc<PluginRegistry>,
    perf: PerfTrace,
    shutdown_tx: ShutdownTx,
}

impl Scheduler {
    pub fn new(config: JobConfig, registry: Arc<PluginRegistry>) -> Self {
        register_metrics();

        let perf = PerfTrace::new(config.id, &config.perf_trace);
        // The receiver is not needed, workers subscribe through the sender.
        let (shutdown_tx, _) = create_shutdown_channel();

        Self {
            config: Arc::new(config),
            registry,
            perf,
            shutdown_tx,
        }
    }

    pub fn job_id(&self) -> u64 {
        self.config.id
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub fn perf_trace(&self) -> &PerfTrace {
        &self.perf
    }

    /// Returns a handle to stop the job: slices not started yet are cancelled and running
    /// readers stop at their next record.
    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    pub fn shutdown(&self) {
        info!(job_id = self.config.id, "shutting down the job");

        self.shutdown_tx.shutdown();
    }

    /// Runs every slice to a terminal state and returns their reports.
    ///
    /// Fails before starting anything when the job configuration is invalid or there is no
    /// slice to run.
    pub async fn run(&self, slices: Vec<SliceConfig>) -> SyncResult<JobResult> {
        self.config.validate()?;
        if slices.is_empty() {
            bail!(ErrorKind::NoSplitUnits, "The job has no slice to run");
        }

        let task_groups =
            assign_task_groups(slices.len(), self.config.scheduler.channels_per_task_group);
        info!(
            job_id = self.config.id,
            slices = slices.len(),
            task_groups = task_groups.iter().max().map_or(0, |max| max + 1),
            concurrency = self.config.scheduler.concurrency,
            "starting job"
        );

        let pool = SliceWorkerPool::new();
        let run_permit = Arc::new(Semaphore::new(self.config.scheduler.concurrency));

        {
            // Workers report back through the pool lock, so none can finish before every
            // worker is registered.
            let mut workers = pool.lock().await;
            for (slice_index, (slice, task_group_id)) in
                slices.into_iter().zip(task_groups).enumerate()
            {
                let spec = SliceSpec {
                    slice_index,
                    task_group_id,
                    task_id: slice_index as u32,
                    reader_name: slice.reader_name,
                    reader_config: slice.reader,
                    writer_name: slice.writer_name,
                    writer_config: slice.writer,
                };
                let worker = SliceWorker::new(
                    spec,
                    self.config.clone(),
                    self.registry.clone(),
                    self.perf.clone(),
                    pool.clone(),
                    run_permit.clone(),
                    self.shutdown_tx.clone(),
                );

                workers.start_worker(worker).await?;
            }
        }

        let reports = pool.wait_all().await;

        let result = JobResult {
            job_id: self.config.id,
            slices: reports,
            perf_summary: self.perf.summarize(),
            perf_report: self.perf.report(ReportScope::Completed),
        };

        for (task_group_id, slices) in result.task_groups() {
            debug!(
                task_group_id,
                slices = slices.len(),
                failed = slices.iter().filter(|slice| !slice.is_success()).count(),
                "task group finished"
            );
        }

        if self.perf.is_enabled() {
            info!("{}", result.perf_summary);
        }

        if result.is_success() {
            info!(
                job_id = self.config.id,
                records = result.records_written(),
                dirty_records = result.dirty().total_records(),
                "job completed successfully"
            );
        } else {
            warn!(
                job_id = self.config.id,
                succeeded = result.succeeded_count(),
                failed = result.failed_count(),
                cancelled = result.cancelled_count(),
                "job completed with failed slices"
            );
        }

        Ok(result)
    }
}
