//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `SubAreaState`: the per-sub-area scanning state machine
//! - `Checkpoint`: the durable "where to resume" snapshot

mod checkpoint;
mod sub_area_state;

// Re-export main types
pub use checkpoint::{Checkpoint, ResumePosition};
pub use sub_area_state::{DoneReason, PageTally, ScanLimits, SubAreaState};
