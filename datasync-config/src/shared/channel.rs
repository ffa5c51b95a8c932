use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Sizing and flow control of the channel connecting a reader task with its writer task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct ChannelConfig {
    /// Maximum number of records buffered in the channel.
    pub capacity: usize,
    /// Maximum number of bytes buffered in the channel.
    pub byte_capacity: usize,
    /// Optional producer throughput limit, in bytes per second.
    pub byte_speed: Option<u64>,
    /// Optional producer throughput limit, in records per second.
    pub record_speed: Option<u64>,
    /// How often, in milliseconds, the producer speed is measured against the limits.
    pub flow_control_interval_ms: u64,
    /// Number of records moved per batch by batched readers and writers.
    pub exchange_batch_size: usize,
}

impl ChannelConfig {
    pub const DEFAULT_CAPACITY: usize = 2048;
    pub const DEFAULT_BYTE_CAPACITY: usize = 8 * 1024 * 1024;
    pub const DEFAULT_FLOW_CONTROL_INTERVAL_MS: u64 = 1000;
    pub const DEFAULT_EXCHANGE_BATCH_SIZE: usize = 32;

    /// Capacity lower bound; a smaller channel spends more time switching than moving records.
    pub const MIN_CAPACITY: usize = 2;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.capacity < Self::MIN_CAPACITY {
            return Err(ValidationError::BelowMinimum {
                name: "channel.capacity",
                min: Self::MIN_CAPACITY as u64,
                value: self.capacity as u64,
            });
        }

        if self.byte_capacity == 0 {
            return Err(ValidationError::ZeroValue("channel.byte_capacity"));
        }

        if self.flow_control_interval_ms == 0 {
            return Err(ValidationError::ZeroValue("channel.flow_control_interval_ms"));
        }

        if self.exchange_batch_size == 0 {
            return Err(ValidationError::ZeroValue("channel.exchange_batch_size"));
        }

        if self.byte_speed == Some(0) {
            return Err(ValidationError::ZeroValue("channel.byte_speed"));
        }

        if self.record_speed == Some(0) {
            return Err(ValidationError::ZeroValue("channel.record_speed"));
        }

        Ok(())
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: Self::DEFAULT_CAPACITY,
            byte_capacity: Self::DEFAULT_BYTE_CAPACITY,
            byte_speed: None,
            record_speed: None,
            flow_control_interval_ms: Self::DEFAULT_FLOW_CONTROL_INTERVAL_MS,
            exchange_batch_size: Self::DEFAULT_EXCHANGE_BATCH_SIZE,
        }
    }
}
