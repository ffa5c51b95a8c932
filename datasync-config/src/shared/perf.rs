use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Settings of the per-phase performance trace.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct PerfTraceConfig {
    /// Turns tracing on; when off every trace operation is a no-op.
    pub enabled: bool,
    /// Keeps the reportable totals (task total, SQL query, result iteration) up to date.
    pub report_enabled: bool,
    /// Number of completed phase records buffered before they are folded into the summary.
    pub batch_size: usize,
}

impl PerfTraceConfig {
    pub const DEFAULT_BATCH_SIZE: usize = 5000;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.batch_size == 0 {
            return Err(ValidationError::ZeroValue("perf_trace.batch_size"));
        }

        Ok(())
    }
}

impl Default for PerfTraceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            report_enabled: true,
            batch_size: Self::DEFAULT_BATCH_SIZE,
        }
    }
}
