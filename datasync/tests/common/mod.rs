//! Test plugins and helpers shared by the integration tests.

#![allow(dead_code)]

pub mod plugins;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize};

use datasync::config::Configuration;
use datasync::plugin::{MemoryBuffer, PluginRegistry, Reader};
use datasync_config::shared::JobConfig;
use serde_json::Value;

use crate::common::plugins::{
    DirtyWriter, EarlyExitWriter, FailingWriter, IndexedSplitter, ReaderCounters, TestReader,
};

/// Plugins registered by [`test_registry`] and the handles observing them.
pub struct TestPlugins {
    pub registry: PluginRegistry,
    pub buffer: MemoryBuffer,
    pub counters: ReaderCounters,
    pub dirty_writer_written: Arc<AtomicU64>,
    pub failing_writer_destroyed: Arc<AtomicUsize>,
}

/// Builds a registry holding the memory plugins plus:
/// - the `test` reader, split by [`IndexedSplitter`],
/// - the `unbuildable` reader, whose factory panics,
/// - the `dirty` writer,
/// - the `early_exit` writer,
/// - the `failing` writer.
pub fn test_registry() -> TestPlugins {
    let buffer = MemoryBuffer::new();
    let counters = ReaderCounters::new();
    let dirty_writer_written = Arc::new(AtomicU64::new(0));
    let failing_writer_destroyed = Arc::new(AtomicUsize::new(0));

    let mut registry = PluginRegistry::with_memory_plugins(buffer.clone());
    let reader_counters = counters.clone();
    registry.register_reader("test", IndexedSplitter, move || {
        Box::new(TestReader::new(reader_counters.clone()))
    });
    let written = dirty_writer_written.clone();
    registry.register_writer("dirty", move || Box::new(DirtyWriter::new(written.clone())));
    registry.register_reader("unbuildable", IndexedSplitter, || -> Box<dyn Reader> {
        panic!("reader factory failed")
    });
    registry.register_writer("early_exit", || Box::new(EarlyExitWriter));
    let destroyed = failing_writer_destroyed.clone();
    registry.register_writer("failing", move || Box::new(FailingWriter::new(destroyed.clone())));

    TestPlugins {
        registry,
        buffer,
        counters,
        dirty_writer_written,
        failing_writer_destroyed,
    }
}

/// Returns a job configuration with the given concurrency and small channels.
pub fn job_config(concurrency: usize) -> JobConfig {
    let mut config = JobConfig::default();
    config.id = 42;
    config.channel.capacity = 16;
    config.scheduler.concurrency = concurrency;

    config
}

/// Builds the content of a job from its plugin names and parameters.
pub fn job_content(
    reader: &str,
    reader_parameter: Value,
    writer: &str,
    writer_parameter: Value,
) -> Configuration {
    Configuration::from_value(serde_json::json!({
        "reader": {"name": reader, "parameter": reader_parameter},
        "writer": {"name": writer, "parameter": writer_parameter},
    }))
}
