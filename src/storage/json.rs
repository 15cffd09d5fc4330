//! JSON file storage implementation
//!
//! This module provides a file-based implementation of the Store trait.
//! The snapshot is self-contained: a fresh process can load it with no
//! other state.

use crate::record::Record;
use crate::state::Checkpoint;
use crate::storage::traits::{Store, StorageError, StorageResult};
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// JSON file storage backend
pub struct JsonStore {
    snapshot_path: PathBuf,
    checkpoint_path: PathBuf,
}

impl JsonStore {
    /// Creates a store writing to the given snapshot and checkpoint paths
    pub fn new(snapshot_path: impl Into<PathBuf>, checkpoint_path: impl Into<PathBuf>) -> Self {
        Self {
            snapshot_path: snapshot_path.into(),
            checkpoint_path: checkpoint_path.into(),
        }
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint_path
    }
}

impl Store for JsonStore {
    fn save_snapshot(&mut self, records: &[Record]) -> StorageResult<()> {
        let json = serde_json::to_vec_pretty(records)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        write_atomic(&self.snapshot_path, &json)?;
        tracing::debug!(
            "Saved {} records to {}",
            records.len(),
            self.snapshot_path.display()
        );
        Ok(())
    }

    fn save_checkpoint(&mut self, checkpoint: &Checkpoint) -> StorageResult<()> {
        let json = serde_json::to_vec_pretty(checkpoint)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        write_atomic(&self.checkpoint_path, &json)?;
        tracing::debug!("Saved checkpoint to {}", self.checkpoint_path.display());
        Ok(())
    }

    fn load_snapshot(&self) -> StorageResult<Vec<Record>> {
        Ok(read_json(&self.snapshot_path)?.unwrap_or_default())
    }

    fn load_checkpoint(&self) -> StorageResult<Option<Checkpoint>> {
        read_json(&self.checkpoint_path)
    }
}

/// Reads and parses a JSON file; `None` when it does not exist
fn read_json<T: DeserializeOwned>(path: &Path) -> StorageResult<Option<T>> {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    serde_json::from_slice(&content)
        .map(Some)
        .map_err(|e| StorageError::Corrupt {
            path: path.display().to_string(),
            message: e.to_string(),
        })
}

/// Sibling temporary path used while writing `path`
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Atomically replaces `path` with `content`
///
/// The content is written and synced to a sibling temporary file, which is
/// then renamed over the destination. Readers see either the old file or the
/// new one, never a partial write.
pub fn write_atomic(path: &Path, content: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp = temp_path(path);
    {
        let mut file = File::create(&tmp)?;
        file.write_all(content)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}
