//! The in-memory record model moved between readers and writers.

mod column;
#[allow(clippy::module_inception)]
mod record;

pub use column::*;
pub use record::*;
