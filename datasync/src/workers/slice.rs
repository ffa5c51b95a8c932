use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use datasync_config::shared::JobConfig;
use metrics::{counter, gauge, histogram};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, warn};

use crate::channel::{ChannelStatsSnapshot, RecordReceiver, RecordSender, record_channel};
use crate::concurrency::panic::{catch_panic, catch_panic_result, catch_panic_sync};
use crate::concurrency::shutdown::{ShutdownRx, ShutdownTx, create_shutdown_channel};
use crate::config::Configuration;
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::metrics::{
    DATASYNC_BYTES_TRANSPORTED_TOTAL, DATASYNC_DIRTY_RECORDS_TOTAL,
    DATASYNC_RECORDS_TRANSPORTED_TOTAL, DATASYNC_SLICE_DURATION_SECONDS, DATASYNC_SLICES_ACTIVE,
    SIDE, STATUS,
};
use crate::perf::{PerfTrace, Phase, PhaseHandle};
use crate::plugin::{
    DirtyRecordCollector, DirtyRecordStats, PluginRegistry, PluginType, Reader, Writer,
};
use crate::sync_error;
use crate::workers::base::{Worker, WorkerHandle};
use crate::workers::pool::SliceWorkerPool;

/// Identity and configurations of one slice of a job.
#[derive(Debug, Clone)]
pub struct SliceSpec {
    /// Position of the slice in the job, starting at 0.
    pub slice_index: usize,
    pub task_group_id: u32,
    pub task_id: u32,
    pub reader_name: String,
    pub reader_config: Configuration,
    pub writer_name: String,
    pub writer_config: Configuration,
}

/// Lifecycle status of a slice.
///
/// A slice moves from `Pending` to `Running` and then to `Succeeded` or `Failed`, or from
/// `Pending` straight to `Cancelled` when it never started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SliceStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl SliceStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SliceStatus::Succeeded | SliceStatus::Failed | SliceStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: SliceStatus) -> bool {
        matches!(
            (self, next),
            (SliceStatus::Pending, SliceStatus::Running)
                | (SliceStatus::Pending, SliceStatus::Cancelled)
                | (SliceStatus::Running, SliceStatus::Succeeded)
                | (SliceStatus::Running, SliceStatus::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SliceStatus::Pending => "pending",
            SliceStatus::Running => "running",
            SliceStatus::Succeeded => "succeeded",
            SliceStatus::Failed => "failed",
            SliceStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SliceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared, observable status of a slice.
#[derive(Debug, Clone)]
pub struct SliceState {
    slice_index: usize,
    task_group_id: u32,
    task_id: u32,
    status: Arc<Mutex<SliceStatus>>,
}

impl SliceState {
    fn new(spec: &SliceSpec) -> Self {
        Self {
            slice_index: spec.slice_index,
            task_group_id: spec.task_group_id,
            task_id: spec.task_id,
            status: Arc::new(Mutex::new(SliceStatus::Pending)),
        }
    }

    pub fn slice_index(&self) -> usize {
        self.slice_index
    }

    pub fn task_group_id(&self) -> u32 {
        self.task_group_id
    }

    pub fn task_id(&self) -> u32 {
        self.task_id
    }

    pub fn status(&self) -> SliceStatus {
        *self
            .status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Moves the slice to `next`, returning `false` and leaving the status untouched when the
    /// transition is not allowed.
    pub fn transition(&self, next: SliceStatus) -> bool {
        let mut status = self
            .status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !status.can_transition_to(next) {
            warn!(
                slice_index = self.slice_index,
                "refusing slice status change from '{}' to '{}'", *status, next
            );

            return false;
        }

        debug!(
            slice_index = self.slice_index,
            "slice status changing from '{}' to '{}'", *status, next
        );
        *status = next;

        true
    }
}

/// Outcome of one slice.
#[derive(Debug, Clone)]
pub struct SliceReport {
    pub slice_index: usize,
    pub task_group_id: u32,
    pub task_id: u32,
    pub status: SliceStatus,
    pub channel: ChannelStatsSnapshot,
    pub dirty: DirtyRecordStats,
    pub dirty_samples: Vec<Value>,
    pub reader_error: Option<SyncError>,
    pub writer_error: Option<SyncError>,
    pub elapsed: Duration,
}

impl SliceReport {
    fn empty(state: &SliceState, status: SliceStatus) -> Self {
        Self {
            slice_index: state.slice_index,
            task_group_id: state.task_group_id,
            task_id: state.task_id,
            status,
            channel: ChannelStatsSnapshot::default(),
            dirty: DirtyRecordStats::default(),
            dirty_samples: Vec::new(),
            reader_error: None,
            writer_error: None,
            elapsed: Duration::ZERO,
        }
    }

    pub(crate) fn cancelled(state: &SliceState) -> Self {
        Self::empty(state, SliceStatus::Cancelled)
    }

    /// Report of a slice whose worker task could not complete.
    pub(crate) fn lost(state: &SliceState, err: SyncError) -> Self {
        let mut report = Self::empty(state, SliceStatus::Failed);
        report.reader_error = Some(err);

        report
    }

    /// Records the reader produced into the channel.
    pub fn records_read(&self) -> u64 {
        self.channel.records_pushed
    }

    /// Records the writer took from the channel.
    pub fn records_written(&self) -> u64 {
        self.channel.records_pulled
    }

    pub fn bytes_read(&self) -> u64 {
        self.channel.bytes_pushed
    }

    pub fn is_success(&self) -> bool {
        self.status == SliceStatus::Succeeded
    }

    /// Returns the errors of the slice, attributed to the slice and the side that raised them.
    pub fn error(&self) -> Option<SyncError> {
        let mut errors = Vec::new();
        if let Some(err) = &self.reader_error {
            errors.push(self.attribute(PluginType::Reader, err));
        }
        if let Some(err) = &self.writer_error {
            errors.push(self.attribute(PluginType::Writer, err));
        }

        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(SyncError::many(errors)),
        }
    }

    /// Raw errors of both sides, as returned by the plugins.
    pub fn raw_errors(&self) -> impl Iterator<Item = &SyncError> {
        self.reader_error.iter().chain(self.writer_error.iter())
    }

    fn attribute(&self, side: PluginType, err: &SyncError) -> SyncError {
        let kind = match (err.kind(), side) {
            (kind @ (ErrorKind::SliceCancelled | ErrorKind::SliceTaskPanic), _) => kind,
            (_, PluginType::Reader) => ErrorKind::ReaderFailed,
            (_, PluginType::Writer) => ErrorKind::WriterFailed,
        };

        sync_error!(
            kind,
            "Slice failed",
            format!(
                "slice {} (task group {}, task {}) {}: {err}",
                self.slice_index,
                self.task_group_id,
                self.task_id,
                side.as_str()
            )
        )
    }
}

/// Handle to a spawned [`SliceWorker`].
#[derive(Debug)]
pub struct SliceWorkerHandle {
    state: SliceState,
    handle: Option<JoinHandle<SliceReport>>,
}

impl WorkerHandle<SliceState> for SliceWorkerHandle {
    type Output = SliceReport;

    fn state(&self) -> SliceState {
        self.state.clone()
    }

    async fn wait(mut self) -> SyncResult<SliceReport> {
        let Some(handle) = self.handle.take() else {
            return Ok(SliceReport::cancelled(&self.state));
        };

        Ok(handle.await?)
    }
}

/// Runs one slice: a reader and a writer connected by a dedicated channel.
#[derive(Debug)]
pub struct SliceWorker {
    spec: SliceSpec,
    job: Arc<JobConfig>,
    registry: Arc<PluginRegistry>,
    perf: PerfTrace,
    pool: SliceWorkerPool,
    run_permit: Arc<Semaphore>,
    shutdown_tx: ShutdownTx,
}

impl SliceWorker {
    pub fn new(
        spec: SliceSpec,
        job: Arc<JobConfig>,
        registry: Arc<PluginRegistry>,
        perf: PerfTrace,
        pool: SliceWorkerPool,
        run_permit: Arc<Semaphore>,
        shutdown_tx: ShutdownTx,
    ) -> Self {
        Self {
            spec,
            job,
            registry,
            perf,
            pool,
            run_permit,
            shutdown_tx,
        }
    }

    pub fn slice_index(&self) -> usize {
        self.spec.slice_index
    }
}

impl SliceWorker {
    /// Waits for a run permit, then runs the slice unless the job stopped in the meantime.
    async fn run(&self, state: &SliceState) -> SliceReport {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        // The permit bounds the number of slices running at once across all task groups.
        let permit = tokio::select! {
            biased;

            _ = shutdown_rx.requested() => None,
            permit = self.run_permit.clone().acquire_owned() => permit.ok(),
        };

        match permit {
            Some(permit) if !self.pool.is_halted() && !shutdown_rx.is_shutdown() => {
                state.transition(SliceStatus::Running);
                let report = run_slice(
                    &self.spec,
                    &self.job,
                    &self.registry,
                    &self.perf,
                    shutdown_rx,
                )
                .await;
                state.transition(report.status);

                // Halting before the permit is released keeps a waiting slice from
                // starting in between.
                self.on_finished(&report);
                drop(permit);

                report
            }
            _ => {
                info!("slice cancelled before starting");
                state.transition(SliceStatus::Cancelled);

                SliceReport::cancelled(state)
            }
        }
    }

    fn on_finished(&self, report: &SliceReport) {
        if report.status != SliceStatus::Failed {
            return;
        }

        if report.raw_errors().any(|err| err.kind().is_configuration()) {
            warn!("configuration error in slice, no further slice will be started");
            self.pool.halt();
        }
        if self.job.scheduler.abort_on_first_failure {
            warn!("slice failed, aborting the job");
            self.pool.halt();
            self.shutdown_tx.shutdown();
        }
    }
}

impl Worker<SliceWorkerHandle, SliceState> for SliceWorker {
    type Error = SyncError;

    async fn start(self) -> Result<SliceWorkerHandle, Self::Error> {
        let state = SliceState::new(&self.spec);
        let slice_span = tracing::info_span!(
            "slice",
            slice_index = self.spec.slice_index,
            task_group_id = self.spec.task_group_id,
            task_id = self.spec.task_id
        );

        let state_clone = state.clone();
        let slice_worker = async move {
            let report = match catch_panic(self.run(&state_clone)).await {
                Ok(report) => report,
                Err(err) => {
                    error!(error = %err, "slice worker panicked");
                    state_clone.transition(SliceStatus::Failed);
                    let report = SliceReport::lost(&state_clone, err);
                    self.on_finished(&report);

                    report
                }
            };

            // The pool waits until every slice is marked finished, panicked ones included.
            self.pool
                .lock()
                .await
                .mark_worker_finished(self.spec.slice_index);

            report
        };

        let handle = tokio::spawn(slice_worker.instrument(slice_span));

        Ok(SliceWorkerHandle {
            state,
            handle: Some(handle),
        })
    }
}

/// Identifies the task a phase is timed for.
#[derive(Debug, Clone)]
struct PhaseTimer {
    perf: PerfTrace,
    task_group_id: u32,
    task_id: u32,
}

impl PhaseTimer {
    fn start(&self, phase: Phase) -> PhaseHandle {
        self.perf
            .start_phase(self.task_group_id, self.task_id, phase)
    }

    async fn timed<F>(&self, phase: Phase, step: F) -> SyncResult<()>
    where
        F: Future<Output = SyncResult<()>>,
    {
        let handle = self.start(phase);
        let result = catch_panic_result(step).await;
        handle.end();

        result
    }
}

async fn run_slice(
    spec: &SliceSpec,
    job: &JobConfig,
    registry: &PluginRegistry,
    perf: &PerfTrace,
    shutdown_rx: ShutdownRx,
) -> SliceReport {
    let started = Instant::now();
    let timer = PhaseTimer {
        perf: perf.clone(),
        task_group_id: spec.task_group_id,
        task_id: spec.task_id,
    };
    let total = timer.start(Phase::TaskTotal);
    if let Some(detail) = task_detail(&spec.reader_config) {
        perf.add_task_details(spec.task_id, &detail);
    }

    gauge!(DATASYNC_SLICES_ACTIVE).increment(1.0);
    info!(
        reader = spec.reader_name.as_str(),
        writer = spec.writer_name.as_str(),
        "starting slice"
    );

    // A failing writer stops the reader through the slice's own shutdown, which also follows
    // the job's.
    let (slice_shutdown_tx, slice_shutdown_rx) = create_shutdown_channel();
    let follow_job = tokio::spawn({
        let slice_shutdown_tx = slice_shutdown_tx.clone();
        let mut shutdown_rx = shutdown_rx;
        async move {
            shutdown_rx.requested().await;
            slice_shutdown_tx.shutdown();
        }
    });

    let collector = DirtyRecordCollector::new(&job.dirty_record);
    let (sender, receiver) = record_channel(&job.channel, Some(slice_shutdown_rx));
    let stats = sender.stats().clone();

    let plugins = catch_panic_sync(|| create_plugins(spec, registry)).and_then(|plugins| plugins);
    let (reader_error, writer_error) = match plugins {
        Ok((reader, writer)) => {
            let writer_task = tokio::spawn(
                run_writer(
                    writer,
                    spec.writer_config.clone(),
                    receiver,
                    collector.for_side(PluginType::Writer),
                    timer.clone(),
                    slice_shutdown_tx,
                )
                .instrument(tracing::info_span!("writer", plugin = spec.writer_name.as_str())),
            );
            let reader_task = tokio::spawn(
                run_reader(
                    reader,
                    spec.reader_config.clone(),
                    sender,
                    collector.for_side(PluginType::Reader),
                    timer.clone(),
                )
                .instrument(tracing::info_span!("reader", plugin = spec.reader_name.as_str())),
            );

            let (reader_result, writer_result) = tokio::join!(reader_task, writer_task);

            (task_error(reader_result), task_error(writer_result))
        }
        Err(err) => (Some(err), None),
    };
    follow_job.abort();

    let channel = stats.snapshot();
    timer
        .start(Phase::WaitWriteTime)
        .end_with(channel.producer_wait_nanos);
    timer
        .start(Phase::WaitReadTime)
        .end_with(channel.consumer_wait_nanos);
    total.end();

    let status = if reader_error.is_none() && writer_error.is_none() {
        SliceStatus::Succeeded
    } else {
        SliceStatus::Failed
    };
    let dirty = collector.stats();
    let elapsed = started.elapsed();

    gauge!(DATASYNC_SLICES_ACTIVE).decrement(1.0);
    histogram!(DATASYNC_SLICE_DURATION_SECONDS, STATUS => status.as_str())
        .record(elapsed.as_secs_f64());
    counter!(DATASYNC_DIRTY_RECORDS_TOTAL, SIDE => PluginType::Reader.as_str())
        .increment(dirty.reader_records);
    counter!(DATASYNC_DIRTY_RECORDS_TOTAL, SIDE => PluginType::Writer.as_str())
        .increment(dirty.writer_records);
    if status == SliceStatus::Succeeded {
        counter!(DATASYNC_RECORDS_TRANSPORTED_TOTAL).increment(channel.records_pulled);
        counter!(DATASYNC_BYTES_TRANSPORTED_TOTAL).increment(channel.bytes_pulled);
    }

    match status {
        SliceStatus::Succeeded => info!(
            records = channel.records_pulled,
            bytes = channel.bytes_pulled,
            dirty_records = dirty.total_records(),
            elapsed_ms = elapsed.as_millis() as u64,
            "slice succeeded"
        ),
        _ => error!(
            records_read = channel.records_pushed,
            records_written = channel.records_pulled,
            reader_error = ?reader_error,
            writer_error = ?writer_error,
            "slice failed"
        ),
    }

    SliceReport {
        slice_index: spec.slice_index,
        task_group_id: spec.task_group_id,
        task_id: spec.task_id,
        status,
        channel,
        dirty,
        dirty_samples: collector.samples(),
        reader_error,
        writer_error,
        elapsed,
    }
}

fn create_plugins(
    spec: &SliceSpec,
    registry: &PluginRegistry,
) -> SyncResult<(Box<dyn Reader>, Box<dyn Writer>)> {
    Ok((
        registry.create_reader(&spec.reader_name)?,
        registry.create_writer(&spec.writer_name)?,
    ))
}

fn task_error(result: Result<SyncResult<()>, tokio::task::JoinError>) -> Option<SyncError> {
    match result {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(err),
        Err(err) => Some(err.into()),
    }
}

/// Short description of what a slice reads, shown in the performance summary.
fn task_detail(reader_config: &Configuration) -> Option<String> {
    if let Some(clause) = reader_config.get_string("where") {
        return Some(clause);
    }

    reader_config
        .get_string_list("source_files")
        .filter(|files| !files.is_empty())
        .map(|files| format!("[{}", files.join(",")))
}

async fn run_reader(
    mut reader: Box<dyn Reader>,
    config: Configuration,
    mut sender: RecordSender,
    collector: DirtyRecordCollector,
    timer: PhaseTimer,
) -> SyncResult<()> {
    let mut result = timer.timed(Phase::ReadTaskInit, reader.init(config)).await;
    if result.is_ok() {
        result = timer
            .timed(Phase::ReadTaskPrepare, reader.prepare())
            .await;
    }

    if result.is_ok() {
        debug!("reader started");

        let mut data = timer.start(Phase::ReadTaskData);
        result = catch_panic_result(reader.start_read(&mut sender, &collector)).await;

        let stats = sender.stats().snapshot();
        data.add_count(stats.records_pushed);
        data.add_size(stats.bytes_pushed);
        data.end();
    }

    // The writer must observe the end of the stream whatever happened to the reader.
    sender.close().await;

    if result.is_ok() {
        result = timer.timed(Phase::ReadTaskPost, reader.post()).await;
    }

    if let Err(err) = timer.timed(Phase::ReadTaskDestroy, reader.destroy()).await {
        warn!(error = %err, "reader destroy failed");
    }

    if let Err(err) = &result {
        error!(error = %err, "reader failed");
    }

    result
}

async fn run_writer(
    mut writer: Box<dyn Writer>,
    config: Configuration,
    mut receiver: RecordReceiver,
    collector: DirtyRecordCollector,
    timer: PhaseTimer,
    slice_shutdown_tx: ShutdownTx,
) -> SyncResult<()> {
    let mut result = timer.timed(Phase::WriteTaskInit, writer.init(config)).await;
    if result.is_ok() {
        result = timer
            .timed(Phase::WriteTaskPrepare, writer.prepare())
            .await;
    }

    if result.is_ok() {
        debug!("writer started");

        let mut data = timer.start(Phase::WriteTaskData);
        result = catch_panic_result(writer.start_write(&mut receiver, &collector)).await;

        if result.is_ok() && receiver.is_truncated() {
            result = Err(sync_error!(
                ErrorKind::ChannelClosed,
                "Record stream ended without its end-of-stream marker"
            ));
        } else if result.is_ok() && !receiver.is_terminated() {
            let discarded = receiver.drain().await;
            error!(discarded, "writer returned before the end of the stream");

            result = Err(sync_error!(
                ErrorKind::ChannelProtocolViolation,
                "Writer returned before the end of the stream",
                format!("{discarded} records discarded")
            ));
        }

        let stats = receiver.stats().snapshot();
        data.add_count(stats.records_pulled);
        data.add_size(stats.bytes_pulled);
        data.end();
    }

    // Stop the reader, then keep consuming until it closes the stream so that it is never left
    // blocked on a full channel.
    if result.is_err() && !receiver.is_terminated() {
        slice_shutdown_tx.shutdown();
        let discarded = receiver.drain().await;
        debug!(discarded, "drained record channel after writer failure");
    }

    if result.is_ok() {
        result = timer.timed(Phase::WriteTaskPost, writer.post()).await;
    }

    if let Err(err) = timer.timed(Phase::WriteTaskDestroy, writer.destroy()).await {
        warn!(error = %err, "writer destroy failed");
    }

    if let Err(err) = &result {
        error!(error = %err, "writer failed");
    }

    result
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use datasync_config::shared::DirtyRecordConfig;

    use super::*;
    use crate::record::{Column, Record};

    #[derive(Debug, Default)]
    struct PostCountingWriter {
        posted: Arc<AtomicUsize>,
        destroyed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Writer for PostCountingWriter {
        async fn init(&mut self, _config: Configuration) -> SyncResult<()> {
            Ok(())
        }

        async fn start_write(
            &mut self,
            receiver: &mut RecordReceiver,
            _collector: &DirtyRecordCollector,
        ) -> SyncResult<()> {
            while receiver.receive().await.is_some() {}

            Ok(())
        }

        async fn post(&mut self) -> SyncResult<()> {
            self.posted.fetch_add(1, Ordering::SeqCst);

            Ok(())
        }

        async fn destroy(&mut self) -> SyncResult<()> {
            self.destroyed.fetch_add(1, Ordering::SeqCst);

            Ok(())
        }
    }

    #[tokio::test]
    async fn a_stream_cut_short_fails_the_writer_without_post() {
        let job = JobConfig::default();
        let (mut sender, receiver) = record_channel(&job.channel, None);
        for id in 0..3i64 {
            sender
                .send(Record::from_columns(vec![Column::from(id)]))
                .await
                .unwrap();
        }
        // Dropped without sending the end-of-stream marker.
        drop(sender);

        let writer = PostCountingWriter::default();
        let posted = writer.posted.clone();
        let destroyed = writer.destroyed.clone();
        let timer = PhaseTimer {
            perf: PerfTrace::disabled(),
            task_group_id: 0,
            task_id: 0,
        };
        let (slice_shutdown_tx, _slice_shutdown_rx) = create_shutdown_channel();

        let err = run_writer(
            Box::new(writer),
            Configuration::new(),
            receiver,
            DirtyRecordCollector::new(&DirtyRecordConfig::default()),
            timer,
            slice_shutdown_tx,
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ChannelClosed);
        assert_eq!(posted.load(Ordering::SeqCst), 0);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn terminal_statuses_never_change() {
        let spec = SliceSpec {
            slice_index: 0,
            task_group_id: 0,
            task_id: 0,
            reader_name: "generator".to_string(),
            reader_config: Configuration::new(),
            writer_name: "memory".to_string(),
            writer_config: Configuration::new(),
        };
        let state = SliceState::new(&spec);

        assert!(!state.transition(SliceStatus::Succeeded));
        assert!(state.transition(SliceStatus::Running));
        assert!(!state.transition(SliceStatus::Cancelled));
        assert!(state.transition(SliceStatus::Failed));
        assert!(!state.transition(SliceStatus::Succeeded));
        assert!(!state.transition(SliceStatus::Running));
        assert_eq!(state.status(), SliceStatus::Failed);
    }

    #[test]
    fn errors_are_attributed_to_their_slice() {
        let state = SliceState {
            slice_index: 1,
            task_group_id: 0,
            task_id: 1,
            status: Arc::new(Mutex::new(SliceStatus::Failed)),
        };
        let mut report = SliceReport::empty(&state, SliceStatus::Failed);
        report.reader_error = Some(sync_error!(ErrorKind::IoError, "Connection reset"));
        report.writer_error = Some(sync_error!(ErrorKind::SliceCancelled, "Slice cancelled"));

        let err = report.error().unwrap();
        assert_eq!(
            err.kinds(),
            vec![ErrorKind::ReaderFailed, ErrorKind::SliceCancelled]
        );
        assert!(err.to_string().contains("slice 1 (task group 0, task 1) reader"));
        assert_eq!(report.raw_errors().count(), 2);
    }

    #[test]
    fn task_detail_prefers_the_where_clause() {
        let config = Configuration::from_value(serde_json::json!({
            "where": "id >= 0 AND id <= 9",
            "source_files": ["/data/a.csv"]
        }));
        assert_eq!(task_detail(&config).as_deref(), Some("id >= 0 AND id <= 9"));

        let config = Configuration::from_value(serde_json::json!({
            "source_files": ["/data/a.csv", "/data/b.csv"]
        }));
        assert_eq!(task_detail(&config).as_deref(), Some("[/data/a.csv,/data/b.csv"));
        assert_eq!(task_detail(&Configuration::new()), None);
    }
}
