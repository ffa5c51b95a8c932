use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use datasync_config::shared::DirtyRecordConfig;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::error;

use crate::plugin::PluginType;
use crate::record::Record;

/// Dirty record counters of one slice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DirtyRecordStats {
    pub reader_records: u64,
    pub reader_bytes: u64,
    pub writer_records: u64,
    pub writer_bytes: u64,
}

impl DirtyRecordStats {
    pub fn total_records(&self) -> u64 {
        self.reader_records + self.writer_records
    }

    pub fn total_bytes(&self) -> u64 {
        self.reader_bytes + self.writer_bytes
    }

    pub fn merge(&mut self, other: &DirtyRecordStats) {
        self.reader_records += other.reader_records;
        self.reader_bytes += other.reader_bytes;
        self.writer_records += other.writer_records;
        self.writer_bytes += other.writer_bytes;
    }
}

#[derive(Debug, Default)]
struct SideCounters {
    records: AtomicU64,
    bytes: AtomicU64,
}

#[derive(Debug)]
struct Inner {
    reader: SideCounters,
    writer: SideCounters,
    logged: AtomicU64,
    samples: Mutex<Vec<Value>>,
    max_samples: usize,
    max_logged: u64,
}

/// Receives the records a plugin could not process.
///
/// Both halves of a slice share the counters of one collector, each through a view tagged with
/// its [`PluginType`]. Collecting never fails: records are counted, the first ones are kept as
/// JSON samples and logged.
#[derive(Debug, Clone)]
pub struct DirtyRecordCollector {
    side: PluginType,
    inner: Arc<Inner>,
}

impl DirtyRecordCollector {
    pub fn new(config: &DirtyRecordConfig) -> Self {
        let inner = Inner {
            reader: SideCounters::default(),
            writer: SideCounters::default(),
            logged: AtomicU64::new(0),
            samples: Mutex::new(Vec::new()),
            max_samples: config.max_samples,
            max_logged: config.max_logged as u64,
        };

        Self {
            side: PluginType::Writer,
            inner: Arc::new(inner),
        }
    }

    /// Returns a view of this collector attributing records to `side`.
    pub fn for_side(&self, side: PluginType) -> Self {
        Self {
            side,
            inner: self.inner.clone(),
        }
    }

    pub fn side(&self) -> PluginType {
        self.side
    }

    pub fn collect_dirty_record(&self, record: &Record, cause: impl fmt::Display) {
        let counters = match self.side {
            PluginType::Reader => &self.inner.reader,
            PluginType::Writer => &self.inner.writer,
        };
        counters.records.fetch_add(1, Ordering::Relaxed);
        counters
            .bytes
            .fetch_add(record.byte_size() as u64, Ordering::Relaxed);

        let logged = self.inner.logged.fetch_add(1, Ordering::Relaxed);
        let keep_sample = {
            let samples = self
                .inner
                .samples
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            samples.len() < self.inner.max_samples
        };
        if logged >= self.inner.max_logged && !keep_sample {
            return;
        }

        let sample = json!({
            "type": self.side.as_str(),
            "message": cause.to_string(),
            "record": record.to_json(),
        });

        if logged < self.inner.max_logged {
            error!(side = self.side.as_str(), "dirty record: {sample}");
        }
        if keep_sample {
            let mut samples = self
                .inner
                .samples
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if samples.len() < self.inner.max_samples {
                samples.push(sample);
            }
        }
    }

    pub fn stats(&self) -> DirtyRecordStats {
        DirtyRecordStats {
            reader_records: self.inner.reader.records.load(Ordering::Relaxed),
            reader_bytes: self.inner.reader.bytes.load(Ordering::Relaxed),
            writer_records: self.inner.writer.records.load(Ordering::Relaxed),
            writer_bytes: self.inner.writer.bytes.load(Ordering::Relaxed),
        }
    }

    /// Returns the kept samples, oldest first.
    pub fn samples(&self) -> Vec<Value> {
        self.inner
            .samples
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Column;

    fn collector(max_samples: usize) -> DirtyRecordCollector {
        DirtyRecordCollector::new(&DirtyRecordConfig {
            max_samples,
            max_logged: 1,
            limit: None,
        })
    }

    #[test]
    fn counts_per_side() {
        let collector = collector(8);
        let reader = collector.for_side(PluginType::Reader);
        let record = Record::from_columns(vec![Column::from("abcd"), Column::from(1i64)]);

        reader.collect_dirty_record(&record, "unparsable line");
        collector.collect_dirty_record(&record, "value too long");
        collector.collect_dirty_record(&record, "value too long");

        let stats = collector.stats();
        assert_eq!(stats.reader_records, 1);
        assert_eq!(stats.writer_records, 2);
        assert_eq!(stats.reader_bytes, 12);
        assert_eq!(stats.total_bytes(), 36);
        assert_eq!(reader.stats(), stats);
    }

    #[test]
    fn keeps_a_bounded_number_of_samples() {
        let collector = collector(2);
        for i in 0..5 {
            let record = Record::from_columns(vec![Column::from(i as i64)]);
            collector.collect_dirty_record(&record, format!("bad value {i}"));
        }

        let samples = collector.samples();
        assert_eq!(collector.stats().writer_records, 5);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0]["type"], "writer");
        assert_eq!(samples[1]["message"], "bad value 1");
        assert!(samples[0]["record"]["columns"].is_array());
    }
}
