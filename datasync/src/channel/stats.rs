use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
struct ChannelStatsInner {
    records_pushed: AtomicU64,
    bytes_pushed: AtomicU64,
    records_pulled: AtomicU64,
    bytes_pulled: AtomicU64,
    producer_wait_nanos: AtomicU64,
    consumer_wait_nanos: AtomicU64,
}

/// Counters shared by both ends of a record channel.
///
/// Producer wait time is the time the reader spent blocked on a full channel, consumer wait time
/// is the time the writer spent blocked on an empty one.
#[derive(Debug, Clone, Default)]
pub struct ChannelStats {
    inner: Arc<ChannelStatsInner>,
}

/// Point in time copy of [`ChannelStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStatsSnapshot {
    pub records_pushed: u64,
    pub bytes_pushed: u64,
    pub records_pulled: u64,
    pub bytes_pulled: u64,
    pub producer_wait_nanos: u64,
    pub consumer_wait_nanos: u64,
}

impl ChannelStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_push(&self, records: u64, bytes: u64) {
        self.inner.records_pushed.fetch_add(records, Ordering::Relaxed);
        self.inner.bytes_pushed.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_pull(&self, records: u64, bytes: u64) {
        self.inner.records_pulled.fetch_add(records, Ordering::Relaxed);
        self.inner.bytes_pulled.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn add_producer_wait(&self, waited: Duration) {
        self.inner
            .producer_wait_nanos
            .fetch_add(saturating_nanos(waited), Ordering::Relaxed);
    }

    pub(crate) fn add_consumer_wait(&self, waited: Duration) {
        self.inner
            .consumer_wait_nanos
            .fetch_add(saturating_nanos(waited), Ordering::Relaxed);
    }

    pub fn records_pushed(&self) -> u64 {
        self.inner.records_pushed.load(Ordering::Relaxed)
    }

    pub fn bytes_pushed(&self) -> u64 {
        self.inner.bytes_pushed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> ChannelStatsSnapshot {
        ChannelStatsSnapshot {
            records_pushed: self.inner.records_pushed.load(Ordering::Relaxed),
            bytes_pushed: self.inner.bytes_pushed.load(Ordering::Relaxed),
            records_pulled: self.inner.records_pulled.load(Ordering::Relaxed),
            bytes_pulled: self.inner.bytes_pulled.load(Ordering::Relaxed),
            producer_wait_nanos: self.inner.producer_wait_nanos.load(Ordering::Relaxed),
            consumer_wait_nanos: self.inner.consumer_wait_nanos.load(Ordering::Relaxed),
        }
    }
}

fn saturating_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
