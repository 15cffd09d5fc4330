//! In-memory crawl progress and its persistence
//!
//! The journal owns the dataset and the checkpoint and writes both through a
//! [`Store`]. A failed flush is logged and counted but never stops the crawl;
//! the previous files stay intact and the next flush tries again.

use crate::record::{Dataset, Record};
use crate::state::Checkpoint;
use crate::storage::Store;

pub struct Journal {
    store: Box<dyn Store>,
    dataset: Dataset,
    checkpoint: Checkpoint,
    persistence_failures: usize,
}

impl Journal {
    pub fn new(store: Box<dyn Store>, dataset: Dataset, checkpoint: Checkpoint) -> Self {
        Self {
            store,
            dataset,
            checkpoint,
            persistence_failures: 0,
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    pub fn checkpoint_mut(&mut self) -> &mut Checkpoint {
        &mut self.checkpoint
    }

    /// Appends a record unless already collected; see [`Dataset::insert`]
    pub fn insert(&mut self, record: Record) -> bool {
        self.dataset.insert(record)
    }

    /// Number of flushes that did not fully succeed
    pub fn persistence_failures(&self) -> usize {
        self.persistence_failures
    }

    /// Writes the snapshot, then the checkpoint
    ///
    /// The snapshot goes first so that a checkpoint on disk never points past
    /// records that are not on disk. Returns whether both writes succeeded.
    pub fn flush(&mut self) -> bool {
        if let Err(e) = self.store.save_snapshot(self.dataset.records()) {
            tracing::error!("Failed to save snapshot: {}", e);
            self.persistence_failures += 1;
            return false;
        }

        if let Err(e) = self.store.save_checkpoint(&self.checkpoint) {
            tracing::error!("Failed to save checkpoint: {}", e);
            self.persistence_failures += 1;
            return false;
        }

        tracing::debug!(
            "Flushed {} records, checkpoint at {:?}",
            self.dataset.len(),
            self.checkpoint.position()
        );
        true
    }
}
