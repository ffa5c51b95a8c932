use serde::{Deserialize, Serialize};

use crate::load::Config;
use crate::shared::{
    ChannelConfig, DirtyRecordConfig, PerfTraceConfig, SchedulerConfig, ValidationError,
};

/// Engine settings of a sync job.
///
/// The reader and writer parameters of a job are not part of this type; they are plugin specific
/// and handed to the engine as free form content.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct JobConfig {
    /// Identifier of the job, used in logs and performance reports.
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub perf_trace: PerfTraceConfig,
    #[serde(default)]
    pub dirty_record: DirtyRecordConfig,
}

impl JobConfig {
    /// Validates every section, returning the first problem found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.channel.validate()?;
        self.scheduler.validate()?;
        self.perf_trace.validate()?;
        self.dirty_record.validate()?;

        Ok(())
    }
}

impl Config for JobConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}
