//! Entry point turning the content of a job into scheduled slices.

use std::sync::Arc;

use datasync_config::shared::JobConfig;
use tracing::info;

use crate::bail;
use crate::concurrency::shutdown::ShutdownTx;
use crate::config::Configuration;
use crate::error::{ErrorKind, SyncResult};
use crate::plugin::{PluginRegistry, PluginType};
use crate::scheduler::{JobResult, Scheduler, SliceConfig};
use crate::split::{ReplicateSplitter, Splitter};

/// A sync job.
///
/// The content of a job names its plugins and holds their parameters:
///
/// ```json
/// {
///   "reader": {"name": "generator", "parameter": {"slice_record_count": 10}},
///   "writer": {"name": "memory", "parameter": {}}
/// }
/// ```
#[derive(Debug)]
pub struct Job {
    registry: Arc<PluginRegistry>,
    scheduler: Scheduler,
}

impl Job {
    /// Creates a job, failing when `config` is invalid.
    pub fn new(config: JobConfig, registry: PluginRegistry) -> SyncResult<Self> {
        config.validate()?;

        let registry = Arc::new(registry);
        let scheduler = Scheduler::new(config, registry.clone());

        Ok(Self {
            registry,
            scheduler,
        })
    }

    pub fn id(&self) -> u64 {
        self.scheduler.job_id()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.scheduler.shutdown_tx()
    }

    /// Splits the job into at most `advice_number` slices and runs them.
    ///
    /// The reader parameters are partitioned by the splitter registered with the reader and
    /// the writer parameters are replicated to match. Unknown plugins and split failures are
    /// reported before any slice starts.
    pub async fn run(&self, content: &Configuration, advice_number: usize) -> SyncResult<JobResult> {
        let slices = self.split(content, advice_number)?;

        self.scheduler.run(slices).await
    }

    /// Computes the slices of the job without running them.
    pub fn split(&self, content: &Configuration, advice_number: usize) -> SyncResult<Vec<SliceConfig>> {
        let reader_name = content.require_string("reader.name")?;
        let writer_name = content.require_string("writer.name")?;

        if !self.registry.contains(PluginType::Reader, &reader_name) {
            bail!(ErrorKind::UnknownPlugin, "Unknown reader plugin", reader_name);
        }
        if !self.registry.contains(PluginType::Writer, &writer_name) {
            bail!(ErrorKind::UnknownPlugin, "Unknown writer plugin", writer_name);
        }

        let reader_parameter = content
            .get_configuration("reader.parameter")
            .unwrap_or_default();
        let writer_parameter = content
            .get_configuration("writer.parameter")
            .unwrap_or_default();

        let splitter = self.registry.splitter(&reader_name)?;
        let reader_configs = splitter.split(&reader_parameter, advice_number)?;
        let writer_configs = ReplicateSplitter.split(&writer_parameter, reader_configs.len())?;

        info!(
            job_id = self.id(),
            reader = reader_name.as_str(),
            writer = writer_name.as_str(),
            advice_number,
            slices = reader_configs.len(),
            "split job"
        );

        Ok(reader_configs
            .into_iter()
            .zip(writer_configs)
            .map(|(reader, writer)| SliceConfig {
                reader_name: reader_name.clone(),
                reader,
                writer_name: writer_name.clone(),
                writer,
            })
            .collect())
    }
}
