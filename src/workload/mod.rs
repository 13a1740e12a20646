//! Workload module
//!
//! Simulated batch loaders that feed the labelled metrics.

mod runner;

pub use runner::{random_duration, BatchCompletion, RunSummary, WorkloadRunner};
