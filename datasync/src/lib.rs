//! Batch data synchronization core.
//!
//! A job is split into slices, each made of a reader and a writer connected by a bounded record
//! channel. The [`scheduler::Scheduler`] runs the slices under a concurrency ceiling, collects
//! one report per slice and the summary of the shared [`perf::PerfTrace`].

pub mod channel;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod job;
mod macros;
pub mod metrics;
pub mod perf;
pub mod plugin;
pub mod record;
pub mod scheduler;
pub mod split;
pub mod workers;
