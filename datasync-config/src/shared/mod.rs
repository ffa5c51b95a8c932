mod base;
mod channel;
mod dirty;
mod job;
mod perf;
mod scheduler;

pub use base::*;
pub use channel::*;
pub use dirty::*;
pub use job::*;
pub use perf::*;
pub use scheduler::*;
