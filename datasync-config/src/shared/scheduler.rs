use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Controls how slices are grouped and how many of them run at once.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct SchedulerConfig {
    /// Maximum number of slices running at the same time across all task groups.
    pub concurrency: usize,
    /// Number of concurrently running slices hosted by a single task group.
    pub channels_per_task_group: usize,
    /// Stops starting new slices as soon as one slice fails.
    pub abort_on_first_failure: bool,
}

impl SchedulerConfig {
    pub const DEFAULT_CHANNELS_PER_TASK_GROUP: usize = 5;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.concurrency == 0 {
            return Err(ValidationError::ZeroValue("scheduler.concurrency"));
        }

        if self.channels_per_task_group == 0 {
            return Err(ValidationError::ZeroValue(
                "scheduler.channels_per_task_group",
            ));
        }

        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            channels_per_task_group: Self::DEFAULT_CHANNELS_PER_TASK_GROUP,
            abort_on_first_failure: false,
        }
    }
}
