use crate::bail;
use crate::config::Configuration;
use crate::error::{ErrorKind, SyncResult};

/// Computes the slices of a job from the configuration of its reader or writer.
///
/// `advice_number` is the number of slices the caller would like; implementations may return
/// fewer when there are not enough units of work. Every returned configuration is an
/// independent copy.
pub trait Splitter: Send + Sync {
    fn split(
        &self,
        config: &Configuration,
        advice_number: usize,
    ) -> SyncResult<Vec<Configuration>>;
}

/// Splitter that hands the same configuration to every slice.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplicateSplitter;

impl Splitter for ReplicateSplitter {
    fn split(
        &self,
        config: &Configuration,
        advice_number: usize,
    ) -> SyncResult<Vec<Configuration>> {
        check_advice_number(advice_number)?;

        Ok(vec![config.clone(); advice_number])
    }
}

pub(crate) fn check_advice_number(advice_number: usize) -> SyncResult<()> {
    if advice_number == 0 {
        bail!(
            ErrorKind::InvalidSplitConfig,
            "The number of slices must be greater than zero"
        );
    }

    Ok(())
}
