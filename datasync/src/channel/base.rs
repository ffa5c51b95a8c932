use std::sync::Arc;
use std::time::Duration;

use datasync_config::shared::ChannelConfig;
use tokio::sync::{Semaphore, mpsc};
use tokio::time::Instant;
use tracing::{debug, error};

use crate::bail;
use crate::channel::{ChannelStats, FlowControl};
use crate::concurrency::shutdown::ShutdownRx;
use crate::error::{ErrorKind, SyncResult};
use crate::record::Record;

/// Item carried by the channel; `Terminate` is the end-of-stream token.
#[derive(Debug)]
enum Message {
    Record(Record),
    Terminate,
}

/// Creates a channel bounded by `config.capacity` records and `config.byte_capacity` bytes.
///
/// The sender observes `shutdown_rx`, when given, between records and while blocked on a full
/// channel.
pub fn record_channel(
    config: &ChannelConfig,
    shutdown_rx: Option<ShutdownRx>,
) -> (RecordSender, RecordReceiver) {
    let (tx, rx) = mpsc::channel(config.capacity.max(1));
    let byte_capacity = config.byte_capacity.clamp(1, u32::MAX as usize);
    let byte_permits = Arc::new(Semaphore::new(byte_capacity));
    let stats = ChannelStats::new();

    let sender = RecordSender {
        tx,
        byte_permits: byte_permits.clone(),
        byte_capacity,
        stats: stats.clone(),
        flow_control: FlowControl::from_config(config),
        shutdown_rx,
    };
    let receiver = RecordReceiver {
        rx,
        byte_permits,
        byte_capacity,
        stats,
        terminated: false,
        truncated: false,
    };

    (sender, receiver)
}

/// Bytes a record holds in the channel. Records larger than the whole byte capacity are charged
/// the full capacity so that they can still pass once the channel is empty.
fn byte_cost(record: &Record, byte_capacity: usize) -> u32 {
    record.byte_size().min(byte_capacity) as u32
}

/// Producer end of a record channel.
///
/// Sending after the end of the stream is impossible since [`RecordSender::close`] consumes the
/// sender. Dropping a sender without closing it leaves the receiver with a truncated stream.
#[derive(Debug)]
pub struct RecordSender {
    tx: mpsc::Sender<Message>,
    byte_permits: Arc<Semaphore>,
    byte_capacity: usize,
    stats: ChannelStats,
    flow_control: Option<FlowControl>,
    shutdown_rx: Option<ShutdownRx>,
}

impl RecordSender {
    /// Sends a record, waiting while the channel is full.
    ///
    /// Fails with [`ErrorKind::SliceCancelled`] once a shutdown was requested and with
    /// [`ErrorKind::ChannelClosed`] when the receiver is gone. The record is never dropped
    /// because of capacity.
    pub async fn send(&mut self, record: Record) -> SyncResult<()> {
        self.check_cancelled()?;

        let cost = byte_cost(&record, self.byte_capacity);
        let bytes = record.byte_size() as u64;

        match self.try_reserve(cost) {
            Some(permit) => permit.send(Message::Record(record)),
            None => {
                let started = Instant::now();
                let result = self.reserve_cancellable(cost).await;
                self.stats.add_producer_wait(started.elapsed());

                result?.send(Message::Record(record));
            }
        }

        self.stats.record_push(1, bytes);
        self.throttle().await;

        Ok(())
    }

    /// Sends every record in order, each subject to backpressure.
    pub async fn send_all(&mut self, records: impl IntoIterator<Item = Record>) -> SyncResult<()> {
        for record in records {
            self.send(record).await?;
        }

        Ok(())
    }

    /// Enqueues the end-of-stream token.
    ///
    /// Always completes: the token waits for free space like any record, and if the receiver is
    /// gone there is nobody left to notify.
    pub async fn close(self) {
        if self.tx.send(Message::Terminate).await.is_err() {
            debug!("record channel receiver dropped before end of stream");
        }
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    fn check_cancelled(&self) -> SyncResult<()> {
        let cancelled = self
            .shutdown_rx
            .as_ref()
            .is_some_and(|shutdown_rx| shutdown_rx.is_shutdown());

        if cancelled {
            bail!(
                ErrorKind::SliceCancelled,
                "Shutdown requested while sending records"
            );
        }

        Ok(())
    }

    fn try_reserve(&self, cost: u32) -> Option<mpsc::Permit<'_, Message>> {
        let bytes = self.byte_permits.try_acquire_many(cost).ok()?;
        match self.tx.try_reserve() {
            Ok(permit) => {
                bytes.forget();
                Some(permit)
            }
            Err(_) => None,
        }
    }

    async fn reserve(&self, cost: u32) -> SyncResult<mpsc::Permit<'_, Message>> {
        let bytes = match self.byte_permits.acquire_many(cost).await {
            Ok(bytes) => bytes,
            Err(_) => bail!(ErrorKind::ChannelClosed, "Record channel byte budget closed"),
        };

        let Ok(permit) = self.tx.reserve().await else {
            bail!(
                ErrorKind::ChannelClosed,
                "Record channel receiver dropped"
            );
        };

        // The bytes stay accounted until the receiver takes the record out.
        bytes.forget();

        Ok(permit)
    }

    async fn reserve_cancellable(&self, cost: u32) -> SyncResult<mpsc::Permit<'_, Message>> {
        let Some(mut shutdown_rx) = self.shutdown_rx.clone() else {
            return self.reserve(cost).await;
        };

        tokio::select! {
            biased;

            _ = shutdown_rx.requested() => {
                bail!(
                    ErrorKind::SliceCancelled,
                    "Shutdown requested while waiting for channel capacity"
                );
            }

            permit = self.reserve(cost) => permit,
        }
    }

    async fn throttle(&mut self) {
        let Some(flow_control) = self.flow_control.as_mut() else {
            return;
        };

        let delay = flow_control.check(self.stats.records_pushed(), self.stats.bytes_pushed());
        if let Some(delay) = delay {
            debug!(?delay, "record channel over its speed limit, throttling");
            tokio::time::sleep(delay).await;
        }
    }
}

/// Consumer end of a record channel.
#[derive(Debug)]
pub struct RecordReceiver {
    rx: mpsc::Receiver<Message>,
    byte_permits: Arc<Semaphore>,
    byte_capacity: usize,
    stats: ChannelStats,
    terminated: bool,
    truncated: bool,
}

impl RecordReceiver {
    /// Receives the next record, waiting while the channel is empty.
    ///
    /// Returns `None` at the end of the stream and on every call after it.
    pub async fn receive(&mut self) -> Option<Record> {
        if self.terminated {
            return None;
        }

        let message = match self.rx.try_recv() {
            Ok(message) => Some(message),
            Err(mpsc::error::TryRecvError::Empty) => {
                let started = Instant::now();
                let message = self.rx.recv().await;
                self.stats.add_consumer_wait(started.elapsed());

                message
            }
            Err(mpsc::error::TryRecvError::Disconnected) => None,
        };

        self.accept(message)
    }

    /// Receives up to `max` records, waiting only for the first one.
    ///
    /// An empty batch means the end of the stream was reached.
    pub async fn receive_batch(&mut self, max: usize) -> Vec<Record> {
        let mut batch = Vec::with_capacity(max.min(1024));
        let Some(first) = self.receive().await else {
            return batch;
        };
        batch.push(first);

        while batch.len() < max && !self.terminated {
            let message = match self.rx.try_recv() {
                Ok(message) => Some(message),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => None,
            };

            match self.accept(message) {
                Some(record) => batch.push(record),
                None => break,
            }
        }

        batch
    }

    /// Discards records until the end of the stream, returning how many were discarded.
    pub async fn drain(&mut self) -> u64 {
        let mut discarded = 0;
        while self.receive().await.is_some() {
            discarded += 1;
        }

        discarded
    }

    /// Whether the end of the stream was observed.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Whether the stream ended because the sender was dropped without being closed.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    fn accept(&mut self, message: Option<Message>) -> Option<Record> {
        match message {
            Some(Message::Record(record)) => {
                self.byte_permits
                    .add_permits(byte_cost(&record, self.byte_capacity) as usize);
                self.stats.record_pull(1, record.byte_size() as u64);

                Some(record)
            }
            Some(Message::Terminate) => {
                self.terminated = true;
                self.rx.close();

                None
            }
            None => {
                error!("record channel sender dropped without closing the stream");
                self.terminated = true;
                self.truncated = true;

                None
            }
        }
    }
}

/// Waits on `receiver` for at most `timeout`, returning `Err` on timeout.
///
/// Used by writers that must flush partial batches on a schedule.
pub async fn receive_timeout(
    receiver: &mut RecordReceiver,
    timeout: Duration,
) -> Result<Option<Record>, tokio::time::error::Elapsed> {
    tokio::time::timeout(timeout, receiver.receive()).await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::concurrency::shutdown::create_shutdown_channel;
    use crate::record::Column;

    fn config(capacity: usize, byte_capacity: usize) -> ChannelConfig {
        ChannelConfig {
            capacity,
            byte_capacity,
            ..ChannelConfig::default()
        }
    }

    fn record(value: i64) -> Record {
        Record::from_columns(vec![Column::Long(value)])
    }

    #[tokio::test]
    async fn records_arrive_in_order_followed_by_one_end_of_stream() {
        let (mut tx, mut rx) = record_channel(&config(4, 1024), None);

        let producer = tokio::spawn(async move {
            for i in 0..100 {
                tx.send(record(i)).await.unwrap();
            }
            tx.close().await;
        });

        let mut received = Vec::new();
        while let Some(record) = rx.receive().await {
            received.push(record.column(0).unwrap().as_long().unwrap().unwrap());
        }
        producer.await.unwrap();

        assert_eq!(received, (0..100).collect::<Vec<_>>());
        assert!(rx.is_terminated());
        assert!(!rx.is_truncated());
        assert!(rx.receive().await.is_none());
        assert!(rx.receive().await.is_none());

        let stats = rx.stats().snapshot();
        assert_eq!(stats.records_pushed, 100);
        assert_eq!(stats.records_pulled, 100);
        assert_eq!(stats.bytes_pulled, 800);
    }

    #[tokio::test]
    async fn send_blocks_when_record_capacity_is_reached() {
        let (mut tx, mut rx) = record_channel(&config(2, 1024), None);

        tx.send(record(1)).await.unwrap();
        tx.send(record(2)).await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), tx.send(record(3))).await;
        assert!(blocked.is_err());

        let producer = tokio::spawn(async move {
            tx.send(record(3)).await.unwrap();
            tx.close().await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished());

        assert_eq!(rx.receive().await, Some(record(1)));
        tokio::time::timeout(Duration::from_secs(1), producer)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(rx.receive().await, Some(record(2)));
        assert_eq!(rx.receive().await, Some(record(3)));
        assert_eq!(rx.receive().await, None);
        assert!(rx.stats().snapshot().producer_wait_nanos > 0);
    }

    #[tokio::test]
    async fn send_blocks_when_byte_capacity_is_reached() {
        // Each record weighs 8 bytes, so only two fit.
        let (mut tx, mut rx) = record_channel(&config(100, 16), None);

        tx.send(record(1)).await.unwrap();
        tx.send(record(2)).await.unwrap();
        let blocked = tokio::time::timeout(Duration::from_millis(50), tx.send(record(3))).await;
        assert!(blocked.is_err());

        rx.receive().await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), tx.send(record(3)))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn oversized_records_still_pass() {
        let (mut tx, mut rx) = record_channel(&config(4, 4), None);
        let big = Record::from_columns(vec![Column::string("x".repeat(64))]);

        tx.send(big.clone()).await.unwrap();
        tx.close().await;

        assert_eq!(rx.receive().await, Some(big));
        assert_eq!(rx.receive().await, None);
    }

    #[tokio::test]
    async fn batches_stop_at_end_of_stream() {
        let (mut tx, mut rx) = record_channel(&config(16, 1024), None);
        tx.send_all((0..5).map(record)).await.unwrap();
        tx.close().await;

        assert_eq!(rx.receive_batch(3).await.len(), 3);
        assert_eq!(rx.receive_batch(3).await.len(), 2);
        assert!(rx.receive_batch(3).await.is_empty());
        assert!(rx.is_terminated());
    }

    #[tokio::test]
    async fn dropped_sender_truncates_the_stream() {
        let (mut tx, mut rx) = record_channel(&config(4, 1024), None);
        tx.send(record(1)).await.unwrap();
        drop(tx);

        assert_eq!(rx.receive().await, Some(record(1)));
        assert_eq!(rx.receive().await, None);
        assert!(rx.is_truncated());
    }

    #[tokio::test]
    async fn drain_discards_until_end_of_stream() {
        let (mut tx, mut rx) = record_channel(&config(4, 1024), None);
        let producer = tokio::spawn(async move {
            tx.send_all((0..10).map(record)).await.unwrap();
            tx.close().await;
        });

        assert_eq!(rx.drain().await, 10);
        producer.await.unwrap();
    }

    #[tokio::test]
    async fn send_fails_once_receiver_is_gone() {
        let (mut tx, rx) = record_channel(&config(1, 1024), None);
        drop(rx);

        let err = tx.send(record(1)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChannelClosed);
    }

    #[tokio::test]
    async fn shutdown_unblocks_a_waiting_sender() {
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let (mut tx, _rx) = record_channel(&config(2, 1024), Some(shutdown_rx));

        tx.send(record(1)).await.unwrap();
        tx.send(record(2)).await.unwrap();

        let sender = tokio::spawn(async move {
            let result = tx.send(record(3)).await;
            (tx, result)
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown_tx.shutdown();

        let (mut tx, result) = tokio::time::timeout(Duration::from_secs(1), sender)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.unwrap_err().kind(), ErrorKind::SliceCancelled);
        assert_eq!(
            tx.send(record(4)).await.unwrap_err().kind(),
            ErrorKind::SliceCancelled
        );
    }

    #[tokio::test]
    async fn receive_timeout_expires_on_idle_channel() {
        let (_tx, mut rx) = record_channel(&config(2, 1024), None);

        assert!(
            receive_timeout(&mut rx, Duration::from_millis(10))
                .await
                .is_err()
        );
    }
}
