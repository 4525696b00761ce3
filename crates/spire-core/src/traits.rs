//! Trait abstractions for state storage.
//!
//! `StateStore` lets commands and services run against the on-disk
//! [`State`] or an in-memory stand-in.

use std::path::Path;

use crate::Result;
use crate::config::Config;
use crate::lock::LockTable;
use crate::state::{State, SyncCheckpoint};

#[allow(clippy::missing_errors_doc)]
pub trait StateStore {
    /// Get the path to the spire directory.
    fn spire_dir(&self) -> &Path;

    fn load_config(&self) -> Result<Config>;

    /// Branch locks shared with other spire processes on this repository.
    fn lock_table(&self) -> LockTable {
        LockTable::new(self.spire_dir().join("locks"))
    }

    // === Checkpoint ===

    /// Check if a run is parked on a conflict.
    fn is_sync_in_progress(&self) -> bool;

    fn load_checkpoint(&self) -> Result<SyncCheckpoint>;
    fn save_checkpoint(&self, checkpoint: &SyncCheckpoint) -> Result<()>;
    fn clear_checkpoint(&self) -> Result<()>;
}

impl StateStore for State {
    fn spire_dir(&self) -> &Path {
        Self::spire_dir(self)
    }

    fn load_config(&self) -> Result<Config> {
        Self::load_config(self)
    }

    fn is_sync_in_progress(&self) -> bool {
        Self::is_sync_in_progress(self)
    }

    fn load_checkpoint(&self) -> Result<SyncCheckpoint> {
        Self::load_checkpoint(self)
    }

    fn save_checkpoint(&self, checkpoint: &SyncCheckpoint) -> Result<()> {
        Self::save_checkpoint(self, checkpoint)
    }

    fn clear_checkpoint(&self) -> Result<()> {
        Self::clear_checkpoint(self)
    }
}
