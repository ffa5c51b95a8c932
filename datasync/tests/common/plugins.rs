use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use datasync::channel::{RecordReceiver, RecordSender};
use datasync::config::Configuration;
use datasync::error::{ErrorKind, SyncResult};
use datasync::plugin::{DirtyRecordCollector, Reader, Writer};
use datasync::record::{Column, Record};
use datasync::split::Splitter;
use datasync::{bail, sync_error};

/// Gives every slice a copy of the configuration tagged with its index under `slice`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexedSplitter;

impl Splitter for IndexedSplitter {
    fn split(
        &self,
        config: &Configuration,
        advice_number: usize,
    ) -> SyncResult<Vec<Configuration>> {
        let mut slices = Vec::with_capacity(advice_number);
        for slice in 0..advice_number {
            let mut slice_config = config.clone();
            slice_config.set("slice", slice as i64)?;
            slices.push(slice_config);
        }

        Ok(slices)
    }
}

/// Shared counters observing the readers of a job.
#[derive(Debug, Clone, Default)]
pub struct ReaderCounters {
    running: Arc<AtomicUsize>,
    max_running: Arc<AtomicUsize>,
    started: Arc<AtomicUsize>,
    destroyed: Arc<AtomicUsize>,
}

impl ReaderCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn enter(&self) -> RunningGuard {
        self.started.fetch_add(1, Ordering::SeqCst);
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);

        RunningGuard {
            running: self.running.clone(),
        }
    }
}

struct RunningGuard {
    running: Arc<AtomicUsize>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Reader producing `records` rows of `(id, "row-{id}")`.
///
/// Behaves according to its configuration:
/// - `fail_slice`: the slice with this index fails halfway through its rows.
/// - `fail_all`: every slice fails halfway through its rows.
/// - `panic_slice`: the slice with this index panics halfway through its rows.
/// - `config_error_slice`: the slice with this index fails in `init` with a configuration error.
/// - `delay_ms`: pause between two rows.
#[derive(Debug)]
pub struct TestReader {
    counters: ReaderCounters,
    records: i64,
    fail: bool,
    panic: bool,
    delay: Option<Duration>,
}

impl TestReader {
    pub fn new(counters: ReaderCounters) -> Self {
        Self {
            counters,
            records: 0,
            fail: false,
            panic: false,
            delay: None,
        }
    }
}

#[async_trait]
impl Reader for TestReader {
    async fn init(&mut self, config: Configuration) -> SyncResult<()> {
        let slice = config.get_i64("slice");
        if slice.is_some() && config.get_i64("config_error_slice") == slice {
            bail!(
                ErrorKind::ConfigError,
                "Missing connection settings",
                format!("slice {slice:?}")
            );
        }

        self.records = config.get_i64("records").unwrap_or(100);
        self.fail = config.get_bool("fail_all").unwrap_or(false)
            || (slice.is_some() && config.get_i64("fail_slice") == slice);
        self.panic = slice.is_some() && config.get_i64("panic_slice") == slice;
        self.delay = config
            .get_i64("delay_ms")
            .map(|delay| Duration::from_millis(delay as u64));

        Ok(())
    }

    async fn start_read(
        &mut self,
        sender: &mut RecordSender,
        _collector: &DirtyRecordCollector,
    ) -> SyncResult<()> {
        let _running = self.counters.enter();

        for id in 0..self.records {
            if self.panic && id == self.records / 2 {
                panic!("reader crashed after {id} rows");
            }
            if self.fail && id == self.records / 2 {
                return Err(sync_error!(
                    ErrorKind::IoError,
                    "Source connection lost",
                    format!("after {id} rows")
                ));
            }

            let record = Record::from_columns(vec![
                Column::from(id),
                Column::string(format!("row-{id}")),
            ]);
            sender.send(record).await?;

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
        }

        Ok(())
    }

    async fn destroy(&mut self) -> SyncResult<()> {
        self.counters.destroyed.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }
}

/// Writer rejecting every record whose id is a multiple of `dirty_every` as dirty.
#[derive(Debug)]
pub struct DirtyWriter {
    written: Arc<AtomicU64>,
    dirty_every: i64,
}

impl DirtyWriter {
    pub fn new(written: Arc<AtomicU64>) -> Self {
        Self {
            written,
            dirty_every: 0,
        }
    }
}

#[async_trait]
impl Writer for DirtyWriter {
    async fn init(&mut self, config: Configuration) -> SyncResult<()> {
        self.dirty_every = config.require_i64("dirty_every")?;

        Ok(())
    }

    async fn start_write(
        &mut self,
        receiver: &mut RecordReceiver,
        collector: &DirtyRecordCollector,
    ) -> SyncResult<()> {
        while let Some(record) = receiver.receive().await {
            let id = record
                .column(0)
                .and_then(|column| column.as_long().ok().flatten())
                .unwrap_or_default();

            if self.dirty_every > 0 && id % self.dirty_every == 0 {
                collector.collect_dirty_record(&record, format!("value {id} out of range"));
            } else {
                self.written.fetch_add(1, Ordering::SeqCst);
            }
        }

        Ok(())
    }
}

/// Writer returning before the end of the stream.
#[derive(Debug, Default)]
pub struct EarlyExitWriter;

#[async_trait]
impl Writer for EarlyExitWriter {
    async fn init(&mut self, _config: Configuration) -> SyncResult<()> {
        Ok(())
    }

    async fn start_write(
        &mut self,
        receiver: &mut RecordReceiver,
        _collector: &DirtyRecordCollector,
    ) -> SyncResult<()> {
        receiver.receive().await;

        Ok(())
    }
}

/// Writer giving up after `fail_after` records, with an error or with a panic when `panic` is set.
#[derive(Debug)]
pub struct FailingWriter {
    destroyed: Arc<AtomicUsize>,
    fail_after: u64,
    panic: bool,
}

impl FailingWriter {
    pub fn new(destroyed: Arc<AtomicUsize>) -> Self {
        Self {
            destroyed,
            fail_after: 0,
            panic: false,
        }
    }
}

#[async_trait]
impl Writer for FailingWriter {
    async fn init(&mut self, config: Configuration) -> SyncResult<()> {
        self.fail_after = config.get_i64("fail_after").unwrap_or(1) as u64;
        self.panic = config.get_bool("panic").unwrap_or(false);

        Ok(())
    }

    async fn start_write(
        &mut self,
        receiver: &mut RecordReceiver,
        _collector: &DirtyRecordCollector,
    ) -> SyncResult<()> {
        let mut received = 0;
        while receiver.receive().await.is_some() {
            received += 1;
            if received < self.fail_after {
                continue;
            }

            if self.panic {
                panic!("writer crashed after {received} records");
            }
            bail!(
                ErrorKind::InvalidData,
                "Target rejected the batch",
                format!("after {received} records")
            );
        }

        Ok(())
    }

    async fn destroy(&mut self) -> SyncResult<()> {
        self.destroyed.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }
}
