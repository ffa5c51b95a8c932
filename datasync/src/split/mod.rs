//! Partitioning of one reader configuration into independent slice configurations.

mod base;
mod file;
mod range;

pub use base::*;
pub use file::*;
pub use range::*;
