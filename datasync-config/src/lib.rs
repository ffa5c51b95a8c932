//! Configuration for datasync jobs.
//!
//! Detects the runtime environment, loads layered YAML configuration overridden by environment
//! variables and exposes the typed settings consumed by the sync engine: channel sizing and flow
//! control, scheduling limits, performance tracing and dirty record policies.

mod environment;
mod load;
pub mod shared;

pub use environment::*;
pub use load::*;
