use std::time::Duration;

use datasync_config::shared::ChannelConfig;
use tokio::time::Instant;

/// Producer side throughput limiter.
///
/// Every interval the speed measured since the previous check is compared with the configured
/// byte and record limits. When a limit is exceeded the producer sleeps long enough for the
/// average over the interval to fall back to the limit.
#[derive(Debug)]
pub struct FlowControl {
    byte_speed: Option<u64>,
    record_speed: Option<u64>,
    interval: Duration,
    last_check: Instant,
    last_records: u64,
    last_bytes: u64,
}

impl FlowControl {
    /// Returns `None` when no limit is configured.
    pub fn from_config(config: &ChannelConfig) -> Option<Self> {
        if config.byte_speed.is_none() && config.record_speed.is_none() {
            return None;
        }

        Some(Self {
            byte_speed: config.byte_speed,
            record_speed: config.record_speed,
            interval: Duration::from_millis(config.flow_control_interval_ms),
            last_check: Instant::now(),
            last_records: 0,
            last_bytes: 0,
        })
    }

    /// Returns how long the producer must pause given the totals pushed so far, or `None` while
    /// the current interval has not elapsed or the speed is within the limits.
    pub fn check(&mut self, records_pushed: u64, bytes_pushed: u64) -> Option<Duration> {
        let elapsed = self.last_check.elapsed();
        if elapsed < self.interval {
            return None;
        }

        let byte_delay = self.byte_speed.and_then(|limit| {
            throttle_delay(bytes_pushed.saturating_sub(self.last_bytes), limit, elapsed)
        });
        let record_delay = self.record_speed.and_then(|limit| {
            throttle_delay(records_pushed.saturating_sub(self.last_records), limit, elapsed)
        });

        self.last_check = Instant::now();
        self.last_records = records_pushed;
        self.last_bytes = bytes_pushed;

        byte_delay.max(record_delay)
    }
}

/// Computes the pause needed for `amount` units moved in `elapsed` to respect `limit` units per
/// second.
pub fn throttle_delay(amount: u64, limit: u64, elapsed: Duration) -> Option<Duration> {
    if limit == 0 {
        return None;
    }

    let required = Duration::from_secs_f64(amount as f64 / limit as f64);
    let delay = required.checked_sub(elapsed)?;

    (!delay.is_zero()).then_some(delay)
}
