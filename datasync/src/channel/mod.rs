//! Bounded, backpressured transport of records from a reader task to a writer task.

mod base;
mod flow;
mod stats;

pub use base::*;
pub use flow::*;
pub use stats::*;
