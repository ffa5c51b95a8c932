use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Handling of records that failed conversion or were rejected by a writer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct DirtyRecordConfig {
    /// Number of dirty records kept as samples in the job result for each slice.
    pub max_samples: usize,
    /// Number of dirty records logged for each slice.
    pub max_logged: usize,
    /// Optional limit checked against the dirty counts of a finished job.
    pub limit: Option<ErrorLimitConfig>,
}

impl DirtyRecordConfig {
    pub const DEFAULT_MAX_SAMPLES: usize = 128;

    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.limit {
            Some(limit) => limit.validate(),
            None => Ok(()),
        }
    }
}

impl Default for DirtyRecordConfig {
    fn default() -> Self {
        Self {
            max_samples: Self::DEFAULT_MAX_SAMPLES,
            max_logged: Self::DEFAULT_MAX_SAMPLES,
            limit: None,
        }
    }
}

/// Tolerated amount of dirty records.
///
/// When both are set, `records` wins over `percentage`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ErrorLimitConfig {
    /// Absolute number of dirty records tolerated.
    #[serde(default)]
    pub records: Option<u64>,
    /// Tolerated share of dirty records among all read records, within `[0, 1]`.
    #[serde(default)]
    pub percentage: Option<f64>,
}

impl ErrorLimitConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.records.is_none() && self.percentage.is_none() {
            return Err(ValidationError::EmptyErrorLimit);
        }

        if let Some(percentage) = self.percentage {
            if !(0.0..=1.0).contains(&percentage) {
                return Err(ValidationError::PercentageOutOfRange(percentage));
            }
        }

        Ok(())
    }
}
