//! Storage module for persisting crawl data
//!
//! This module handles all durable state of a crawl job:
//! - The dataset snapshot (a JSON array of records)
//! - The resume checkpoint (a JSON object)
//! - The write-only debug archive of anomalous pages
//!
//! All writes go through [`write_atomic`]: content lands in a sibling
//! temporary file which is then renamed over the destination.

mod archive;
mod json;
mod traits;

pub use archive::{ArchiveTag, DebugArchive};
pub use json::{temp_path, write_atomic, JsonStore};
pub use traits::{Store, StorageError, StorageResult};
