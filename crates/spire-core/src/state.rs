//! State persistence for the .git/spire/ directory.
//!
//! The only state the engine keeps between invocations is the checkpoint of a
//! run parked on a conflict. The stack itself is always derived from history.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spire_git::Oid;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::plan::{BranchUpdate, PlannedConflict};
use crate::push::RemoteTips;
use crate::stack::ChainBranch;

/// Manages the .git/spire/ directory.
#[derive(Debug)]
pub struct State {
    spire_dir: PathBuf,
}

impl State {
    const CONFIG_FILE: &'static str = "config.toml";
    const CHECKPOINT_FILE: &'static str = "sync_state.json";

    /// Create a new State instance for the given repository.
    ///
    /// # Errors
    /// Returns error if the path doesn't contain a .git directory.
    pub fn new(repo_path: impl AsRef<Path>) -> Result<Self> {
        let git_dir = repo_path.as_ref().join(".git");
        if !git_dir.exists() {
            return Err(Error::NotARepository);
        }

        Ok(Self {
            spire_dir: git_dir.join("spire"),
        })
    }

    #[must_use]
    pub fn spire_dir(&self) -> &Path {
        &self.spire_dir
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.spire_dir)?;
        Ok(())
    }

    // === Config ===

    fn config_path(&self) -> PathBuf {
        self.spire_dir.join(Self::CONFIG_FILE)
    }

    /// Load the config, or defaults when none was saved.
    ///
    /// # Errors
    /// Returns error if the file exists but can't be read or parsed.
    pub fn load_config(&self) -> Result<Config> {
        Config::load(self.config_path())
    }

    // === Checkpoint ===

    fn checkpoint_path(&self) -> PathBuf {
        self.spire_dir.join(Self::CHECKPOINT_FILE)
    }

    /// Check if a run is parked on a conflict.
    #[must_use]
    pub fn is_sync_in_progress(&self) -> bool {
        self.checkpoint_path().exists()
    }

    /// Load the parked run.
    ///
    /// # Errors
    /// Returns `NoSyncInProgress` if there is none, or a parse error naming
    /// the file.
    pub fn load_checkpoint(&self) -> Result<SyncCheckpoint> {
        let path = self.checkpoint_path();
        if !path.exists() {
            return Err(Error::NoSyncInProgress);
        }

        let content = fs::read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|e| Error::StateParseError {
            file: path,
            message: e.to_string(),
        })
    }

    /// # Errors
    /// Returns error if serialization or write fails.
    pub fn save_checkpoint(&self, checkpoint: &SyncCheckpoint) -> Result<()> {
        self.ensure_dir()?;
        let content = serde_json::to_string_pretty(checkpoint)?;
        fs::write(self.checkpoint_path(), content)?;
        Ok(())
    }

    /// Forget the parked run. Missing checkpoints are fine.
    ///
    /// # Errors
    /// Returns error if file removal fails.
    pub fn clear_checkpoint(&self) -> Result<()> {
        let path = self.checkpoint_path();
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// Remote tip observed before the run started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTip {
    pub branch: String,

    #[serde(with = "crate::serde_oid::option")]
    pub tip: Option<Oid>,
}

/// Everything needed to resume or abort a run parked on a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    pub created_at: DateTime<Utc>,

    /// Base the stack was resolved against.
    pub base: String,

    /// Top of the stack.
    pub head: String,

    #[serde(with = "crate::serde_oid")]
    pub old_base: Oid,

    #[serde(with = "crate::serde_oid")]
    pub new_base: Oid,

    /// The chain as resolved, with original tips.
    pub branches: Vec<ChainBranch>,

    /// Moves already made.
    pub moved: Vec<BranchUpdate>,

    #[serde(default)]
    pub unchanged: Vec<String>,

    pub conflict: PlannedConflict,

    #[serde(default)]
    pub remote_tips: Vec<RemoteTip>,
}

impl SyncCheckpoint {
    /// Remote tips to lease against when pushing.
    #[must_use]
    pub fn expected_tips(&self) -> RemoteTips {
        self.remote_tips
            .iter()
            .map(|t| (t.branch.clone(), t.tip))
            .collect()
    }

    /// The chain branch directly below the conflicting one, if any.
    #[must_use]
    pub fn branch_below_conflict(&self) -> Option<&ChainBranch> {
        let position = self
            .branches
            .iter()
            .position(|b| b.name == self.conflict.branch)?;
        position.checked_sub(1).map(|below| &self.branches[below])
    }

    /// Commit the conflicting branch has to be rebuilt on: where this sync
    /// left the branch below it, or the new base at the bottom of the stack.
    ///
    /// This is not `conflict.onto`, which may be a commit replayed from the
    /// conflicting branch itself that no ref points at.
    #[must_use]
    pub fn conflict_floor(&self) -> Oid {
        let Some(below) = self.branch_below_conflict() else {
            return self.new_base;
        };
        self.moved
            .iter()
            .rev()
            .find(|u| u.branch == below.name)
            .map_or(below.tip, |u| u.to)
    }
}
