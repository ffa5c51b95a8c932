//! Per-phase timing and volume statistics aggregated across all slices of a job.

mod format;
mod phase;
mod trace;

pub use format::*;
pub use phase::*;
pub use trace::*;
