//! Reader and writer plugins, the registry resolving them and the dirty record collector they
//! report to.

mod base;
mod collector;
mod memory;
mod registry;

pub use base::*;
pub use collector::*;
pub use memory::*;
pub use registry::*;
