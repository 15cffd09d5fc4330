//! Output module for run reports
//!
//! The dataset itself is written by the storage layer; this module only
//! covers what a person reads at the end of a run.

pub mod stats;

pub use stats::{print_report, RunReport, RunStatus, TargetFailure};
