use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::bail;
use crate::error::{ErrorKind, SyncResult};
use crate::plugin::{GeneratorReader, MemoryBuffer, MemoryWriter, PluginType, Reader, Writer};
use crate::split::{ReplicateSplitter, Splitter};

type ReaderFactory = Arc<dyn Fn() -> Box<dyn Reader> + Send + Sync>;
type WriterFactory = Arc<dyn Fn() -> Box<dyn Writer> + Send + Sync>;

#[derive(Clone)]
struct ReaderEntry {
    factory: ReaderFactory,
    splitter: Arc<dyn Splitter>,
}

/// Maps plugin names to the factories creating one plugin instance per slice.
///
/// Every reader comes with the [`Splitter`] partitioning its configuration. Writers are always
/// replicated.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    readers: HashMap<String, ReaderEntry>,
    writers: HashMap<String, WriterFactory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the `generator` reader and a `memory` writer collecting into
    /// `buffer`.
    pub fn with_memory_plugins(buffer: MemoryBuffer) -> Self {
        let mut registry = Self::new();
        registry.register_reader("generator", ReplicateSplitter, || {
            Box::new(GeneratorReader::new())
        });
        registry.register_writer("memory", move || Box::new(MemoryWriter::new(buffer.clone())));

        registry
    }

    /// Registers a reader, replacing any reader registered under the same name.
    pub fn register_reader<S, F>(&mut self, name: impl Into<String>, splitter: S, factory: F)
    where
        S: Splitter + 'static,
        F: Fn() -> Box<dyn Reader> + Send + Sync + 'static,
    {
        self.readers.insert(
            name.into(),
            ReaderEntry {
                factory: Arc::new(factory),
                splitter: Arc::new(splitter),
            },
        );
    }

    /// Registers a writer, replacing any writer registered under the same name.
    pub fn register_writer<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Writer> + Send + Sync + 'static,
    {
        self.writers.insert(name.into(), Arc::new(factory));
    }

    pub fn contains(&self, plugin_type: PluginType, name: &str) -> bool {
        match plugin_type {
            PluginType::Reader => self.readers.contains_key(name),
            PluginType::Writer => self.writers.contains_key(name),
        }
    }

    pub fn create_reader(&self, name: &str) -> SyncResult<Box<dyn Reader>> {
        Ok((self.reader_entry(name)?.factory)())
    }

    pub fn create_writer(&self, name: &str) -> SyncResult<Box<dyn Writer>> {
        match self.writers.get(name) {
            Some(factory) => Ok(factory()),
            None => bail!(ErrorKind::UnknownPlugin, "Unknown writer plugin", name),
        }
    }

    pub fn splitter(&self, reader_name: &str) -> SyncResult<Arc<dyn Splitter>> {
        Ok(self.reader_entry(reader_name)?.splitter.clone())
    }

    fn reader_entry(&self, name: &str) -> SyncResult<&ReaderEntry> {
        match self.readers.get(name) {
            Some(entry) => Ok(entry),
            None => bail!(ErrorKind::UnknownPlugin, "Unknown reader plugin", name),
        }
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut readers: Vec<_> = self.readers.keys().collect();
        let mut writers: Vec<_> = self.writers.keys().collect();
        readers.sort();
        writers.sort();

        f.debug_struct("PluginRegistry")
            .field("readers", &readers)
            .field("writers", &writers)
            .finish()
    }
}
