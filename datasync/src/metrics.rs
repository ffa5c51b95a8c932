use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};

static REGISTER_METRICS: Once = Once::new();

pub const DATASYNC_RECORDS_TRANSPORTED_TOTAL: &str = "datasync_records_transported_total";
pub const DATASYNC_BYTES_TRANSPORTED_TOTAL: &str = "datasync_bytes_transported_total";
pub const DATASYNC_DIRTY_RECORDS_TOTAL: &str = "datasync_dirty_records_total";
pub const DATASYNC_SLICES_ACTIVE: &str = "datasync_slices_active";
pub const DATASYNC_SLICE_DURATION_SECONDS: &str = "datasync_slice_duration_seconds";
pub const STATUS: &str = "status";
pub const SIDE: &str = "side";

/// Registers the metrics emitted by datasync. Safe to call more than once, the descriptions are
/// registered only the first time.
pub(crate) fn register_metrics() {
    REGISTER_METRICS.call_once(|| {
        describe_counter!(
            DATASYNC_RECORDS_TRANSPORTED_TOTAL,
            Unit::Count,
            "Total number of records delivered to writers"
        );

        describe_counter!(
            DATASYNC_BYTES_TRANSPORTED_TOTAL,
            Unit::Bytes,
            "Total estimated size of the records delivered to writers"
        );

        describe_counter!(
            DATASYNC_DIRTY_RECORDS_TOTAL,
            Unit::Count,
            "Total number of records reported as dirty by readers and writers"
        );

        describe_gauge!(
            DATASYNC_SLICES_ACTIVE,
            Unit::Count,
            "Number of slices currently running"
        );

        describe_histogram!(
            DATASYNC_SLICE_DURATION_SECONDS,
            Unit::Seconds,
            "Time taken in seconds by a slice from start to its terminal state"
        );
    });
}
