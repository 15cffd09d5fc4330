//! Storage traits and error types
//!
//! This module defines the trait interface for persistence backends and
//! associated error types.

use crate::record::Record;
use crate::state::Checkpoint;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupt file {path}: {message}")]
    Corrupt { path: String, message: String },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for persistence backends
///
/// Every save fully replaces what was stored before. A failed save must leave
/// the previously stored value loadable.
pub trait Store {
    /// Writes the whole dataset
    fn save_snapshot(&mut self, records: &[Record]) -> StorageResult<()>;

    /// Writes the resume checkpoint
    fn save_checkpoint(&mut self, checkpoint: &Checkpoint) -> StorageResult<()>;

    /// Reads the dataset; a missing snapshot is an empty dataset
    fn load_snapshot(&self) -> StorageResult<Vec<Record>>;

    /// Reads the checkpoint, if one was ever written
    fn load_checkpoint(&self) -> StorageResult<Option<Checkpoint>>;
}
