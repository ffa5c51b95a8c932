//! Workers running the slices of a job.
//!
//! A slice worker pairs one reader with one writer through a dedicated record channel, and the
//! worker pool tracks every slice of a job until all of them reached a terminal state.

pub mod base;
pub mod pool;
pub mod slice;
