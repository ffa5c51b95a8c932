use std::sync::Arc;

use async_trait::async_trait;
use rand::distr::{Alphanumeric, SampleString};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::channel::{RecordReceiver, RecordSender};
use crate::config::Configuration;
use crate::error::{ErrorKind, SyncResult};
use crate::plugin::{DirtyRecordCollector, Reader, Writer};
use crate::record::{Column, ColumnType, Record};
use crate::{bail, sync_error};

/// Number of records a [`MemoryWriter`] takes from its channel at once when not configured.
const DEFAULT_WRITE_BATCH_SIZE: usize = 32;

#[derive(Debug, Clone)]
enum ColumnGenerator {
    Constant(Column),
    Increment { next: i64, step: i64 },
    RandomLong { min: i64, max: i64 },
    RandomDouble { min: f64, max: f64 },
    RandomString { min_len: usize, max_len: usize },
    RandomBytes { min_len: usize, max_len: usize },
    RandomBool { true_ratio: f64 },
}

impl ColumnGenerator {
    fn from_value(index: usize, value: &Value) -> SyncResult<Self> {
        let spec = Configuration::from_value(value.clone());
        let path = format!("column[{index}]");
        let column_type = parse_column_type(&spec.require_string("type").map_err(|_| {
            sync_error!(ErrorKind::ConfigError, "Generated column has no type", path)
        })?)?;

        let constant = spec.get_string("value");
        let increment = spec.get_string("incr");
        let random = spec.get_string("random");

        if let Some(constant) = constant {
            if increment.is_some() || random.is_some() {
                warn!(column = index, "constant value takes precedence over incr and random");
            }

            return constant_column(column_type, &constant).map(ColumnGenerator::Constant);
        }

        if let Some(increment) = increment {
            if column_type != ColumnType::Long {
                bail!(
                    ErrorKind::ConfigError,
                    "Only long columns can be incremented",
                    path
                );
            }
            let (start, step) = match increment.split_once(',') {
                Some((start, step)) => (start.trim().parse()?, step.trim().parse()?),
                None => (increment.trim().parse()?, 1),
            };

            return Ok(ColumnGenerator::Increment { next: start, step });
        }

        let Some(random) = random else {
            bail!(
                ErrorKind::ConfigError,
                "Generated column needs one of value, incr or random",
                path
            );
        };
        let Some((min, max)) = random.split_once(',') else {
            bail!(
                ErrorKind::ConfigError,
                "Random columns take a 'min, max' range",
                random
            );
        };
        let (min, max) = (min.trim(), max.trim());

        let generator = match column_type {
            ColumnType::Long => ColumnGenerator::RandomLong {
                min: min.parse()?,
                max: max.parse()?,
            },
            ColumnType::Double => ColumnGenerator::RandomDouble {
                min: min.parse()?,
                max: max.parse()?,
            },
            ColumnType::String => ColumnGenerator::RandomString {
                min_len: min.parse()?,
                max_len: max.parse()?,
            },
            ColumnType::Bytes => ColumnGenerator::RandomBytes {
                min_len: min.parse()?,
                max_len: max.parse()?,
            },
            ColumnType::Bool => {
                let falses: f64 = min.parse()?;
                let trues: f64 = max.parse()?;
                if falses < 0.0 || trues < 0.0 || falses + trues == 0.0 {
                    bail!(ErrorKind::ConfigError, "Invalid bool ratio", random);
                }

                ColumnGenerator::RandomBool {
                    true_ratio: trues / (falses + trues),
                }
            }
            other => bail!(
                ErrorKind::ConfigError,
                "Random values are not supported for this column type",
                other
            ),
        };

        let ordered = match &generator {
            ColumnGenerator::RandomLong { min, max } => min <= max,
            ColumnGenerator::RandomDouble { min, max } => min <= max,
            ColumnGenerator::RandomString { min_len, max_len }
            | ColumnGenerator::RandomBytes { min_len, max_len } => min_len <= max_len,
            _ => true,
        };
        if !ordered {
            bail!(
                ErrorKind::ConfigError,
                "Random range minimum is greater than its maximum",
                random
            );
        }

        Ok(generator)
    }

    fn next(&mut self, rng: &mut StdRng) -> Column {
        match self {
            ColumnGenerator::Constant(column) => column.clone(),
            ColumnGenerator::Increment { next, step } => {
                let value = *next;
                *next = next.wrapping_add(*step);

                Column::Long(value)
            }
            ColumnGenerator::RandomLong { min, max } => Column::Long(rng.random_range(*min..=*max)),
            ColumnGenerator::RandomDouble { min, max } => {
                Column::Double(rng.random_range(*min..=*max))
            }
            ColumnGenerator::RandomString { min_len, max_len } => {
                let len = rng.random_range(*min_len..=*max_len);
                Column::string(Alphanumeric.sample_string(rng, len))
            }
            ColumnGenerator::RandomBytes { min_len, max_len } => {
                let len = rng.random_range(*min_len..=*max_len);
                Column::bytes(Alphanumeric.sample_string(rng, len).into_bytes())
            }
            ColumnGenerator::RandomBool { true_ratio } => {
                Column::Bool(rng.random_bool(*true_ratio))
            }
        }
    }
}

fn parse_column_type(name: &str) -> SyncResult<ColumnType> {
    let column_type = match name.to_ascii_lowercase().as_str() {
        "string" => ColumnType::String,
        "long" => ColumnType::Long,
        "double" => ColumnType::Double,
        "bool" | "boolean" => ColumnType::Bool,
        "date" => ColumnType::Date,
        "bytes" => ColumnType::Bytes,
        "timestamp" => ColumnType::Timestamp,
        _ => bail!(ErrorKind::ConfigError, "Unknown column type", name),
    };

    Ok(column_type)
}

fn constant_column(column_type: ColumnType, value: &str) -> SyncResult<Column> {
    let raw = Column::string(value);
    let column = match column_type {
        ColumnType::String => raw,
        ColumnType::Long => Column::from_option(raw.as_long()?, ColumnType::Long),
        ColumnType::Double => Column::from_option(raw.as_double()?, ColumnType::Double),
        ColumnType::Bool => Column::from_option(raw.as_bool()?, ColumnType::Bool),
        ColumnType::Date => match raw.as_date()? {
            Some(value) => Column::date_time(value),
            None => Column::null(ColumnType::Date),
        },
        ColumnType::Timestamp => match raw.as_timestamp()? {
            Some(value) => Column::Timestamp(value),
            None => Column::null(ColumnType::Timestamp),
        },
        ColumnType::Bytes => Column::bytes(value.as_bytes().to_vec()),
        ColumnType::Null => Column::null(ColumnType::String),
    };

    Ok(column)
}

/// Reader producing synthetic records.
///
/// Settings:
///
/// - `slice_record_count`: number of records produced by each slice
/// - `column`: list of column templates, each with a `type` and one of `value` (a constant),
///   `incr` (`"start[, step]"`, long columns only) or `random` (`"min, max"`, the length range
///   for strings and bytes, the false to true ratio for bools)
/// - `seed`: optional seed making random columns reproducible
#[derive(Debug, Default)]
pub struct GeneratorReader {
    record_count: u64,
    columns: Vec<ColumnGenerator>,
    rng: Option<StdRng>,
}

impl GeneratorReader {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Reader for GeneratorReader {
    async fn init(&mut self, config: Configuration) -> SyncResult<()> {
        let record_count = config.require_i64("slice_record_count")?;
        if record_count < 1 {
            bail!(
                ErrorKind::ConfigError,
                "slice_record_count must be at least 1",
                record_count
            );
        }

        let Some(columns) = config.get_list("column").filter(|columns| !columns.is_empty()) else {
            bail!(ErrorKind::ConfigError, "Missing required column list", "column");
        };

        self.columns = columns
            .iter()
            .enumerate()
            .map(|(index, column)| ColumnGenerator::from_value(index, column))
            .collect::<SyncResult<_>>()?;
        self.record_count = record_count as u64;
        self.rng = Some(match config.get_i64("seed") {
            Some(seed) => StdRng::seed_from_u64(seed as u64),
            None => StdRng::from_os_rng(),
        });

        debug!(
            record_count = self.record_count,
            columns = self.columns.len(),
            "initialized generator reader"
        );

        Ok(())
    }

    async fn start_read(
        &mut self,
        sender: &mut RecordSender,
        _collector: &DirtyRecordCollector,
    ) -> SyncResult<()> {
        let Some(rng) = self.rng.as_mut() else {
            bail!(ErrorKind::ReaderFailed, "Generator reader was not initialized");
        };

        for _ in 0..self.record_count {
            let columns = self.columns.iter_mut().map(|column| column.next(rng)).collect();
            sender.send(Record::from_columns(columns)).await?;
        }

        Ok(())
    }
}

/// Records collected by [`MemoryWriter`]s, shared across slices.
#[derive(Debug, Clone, Default)]
pub struct MemoryBuffer {
    records: Arc<Mutex<Vec<Record>>>,
}

impl MemoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<Record> {
        self.records.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    pub async fn clear(&self) {
        self.records.lock().await.clear();
    }
}

/// Writer appending every record to a [`MemoryBuffer`].
///
/// With `column_count` set, a record of another width fails the slice.
#[derive(Debug)]
pub struct MemoryWriter {
    buffer: MemoryBuffer,
    column_count: Option<usize>,
    batch_size: usize,
    written: u64,
}

impl MemoryWriter {
    pub fn new(buffer: MemoryBuffer) -> Self {
        Self {
            buffer,
            column_count: None,
            batch_size: DEFAULT_WRITE_BATCH_SIZE,
            written: 0,
        }
    }
}

#[async_trait]
impl Writer for MemoryWriter {
    async fn init(&mut self, config: Configuration) -> SyncResult<()> {
        self.column_count = match config.get_i64("column_count") {
            Some(count) if count > 0 => Some(count as usize),
            Some(count) => bail!(
                ErrorKind::ConfigError,
                "column_count must be positive",
                count
            ),
            None => None,
        };
        if let Some(batch_size) = config.get_i64("batch_size") {
            self.batch_size = batch_size.max(1) as usize;
        }

        Ok(())
    }

    async fn start_write(
        &mut self,
        receiver: &mut RecordReceiver,
        _collector: &DirtyRecordCollector,
    ) -> SyncResult<()> {
        loop {
            let batch = receiver.receive_batch(self.batch_size).await;
            if batch.is_empty() {
                break;
            }

            if let Some(expected) = self.column_count {
                if let Some(record) = batch.iter().find(|r| r.column_count() != expected) {
                    bail!(
                        ErrorKind::InvalidData,
                        "Record column count does not match the configured column count",
                        format!("expected {expected}, got {}", record.column_count())
                    );
                }
            }

            self.written += batch.len() as u64;
            self.buffer.records.lock().await.extend(batch);
        }

        Ok(())
    }

    async fn post(&mut self) -> SyncResult<()> {
        info!(records = self.written, "memory writer finished");

        Ok(())
    }
}
