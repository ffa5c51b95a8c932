use async_trait::async_trait;

use crate::channel::{RecordReceiver, RecordSender};
use crate::config::Configuration;
use crate::error::SyncResult;
use crate::plugin::DirtyRecordCollector;

/// Side of a slice a plugin runs on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PluginType {
    Reader,
    Writer,
}

impl PluginType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginType::Reader => "reader",
            PluginType::Writer => "writer",
        }
    }
}

/// Producer half of a slice.
///
/// The slice runner calls `init`, `prepare`, `start_read` and `post` in this order, stopping at
/// the first error, and then always calls `destroy`. The runner closes the channel once
/// `start_read` returns, whatever its outcome.
#[async_trait]
pub trait Reader: Send {
    async fn init(&mut self, config: Configuration) -> SyncResult<()>;

    async fn prepare(&mut self) -> SyncResult<()> {
        Ok(())
    }

    /// Produces every record of the slice into `sender`.
    ///
    /// Records that cannot be produced are reported to `collector` instead of failing the slice.
    async fn start_read(
        &mut self,
        sender: &mut RecordSender,
        collector: &DirtyRecordCollector,
    ) -> SyncResult<()>;

    async fn post(&mut self) -> SyncResult<()> {
        Ok(())
    }

    async fn destroy(&mut self) -> SyncResult<()> {
        Ok(())
    }
}

/// Consumer half of a slice.
///
/// Lifecycle calls follow the same rules as for [`Reader`]. `start_write` must consume the
/// receiver until the end of the stream before returning `Ok`.
#[async_trait]
pub trait Writer: Send {
    async fn init(&mut self, config: Configuration) -> SyncResult<()>;

    async fn prepare(&mut self) -> SyncResult<()> {
        Ok(())
    }

    /// Consumes records from `receiver` until it returns `None`.
    ///
    /// Records that cannot be written are reported to `collector`. Errors that make the rest of
    /// the stream unusable, such as a column count mismatch, are returned.
    async fn start_write(
        &mut self,
        receiver: &mut RecordReceiver,
        collector: &DirtyRecordCollector,
    ) -> SyncResult<()>;

    async fn post(&mut self) -> SyncResult<()> {
        Ok(())
    }

    async fn destroy(&mut self) -> SyncResult<()> {
        Ok(())
    }
}
