//! Mock implementations for testing services.
//!
//! `MemoryRepo` from spire-git covers the git side; these cover state
//! storage and the GitHub API.

use std::cell::RefCell;
use std::path::Path;
use std::sync::Mutex;

use spire_core::config::Config;
use spire_core::{Error as CoreError, Result as CoreResult, StateStore, SyncCheckpoint};
use spire_github::{GitHubApi, PullRequest, PullRequestState, Result as GitHubResult};
use tempfile::TempDir;

/// Mock implementation of `StateStore` for testing.
pub struct MockStateStore {
    pub config: RefCell<Config>,
    pub checkpoint: RefCell<Option<SyncCheckpoint>>,
    /// Holds the lock files.
    spire_dir: TempDir,
}

impl Default for MockStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStateStore {
    pub fn new() -> Self {
        Self {
            config: RefCell::new(Config::default()),
            checkpoint: RefCell::new(None),
            spire_dir: TempDir::new().unwrap_or_else(|err| panic!("temp dir: {err}")),
        }
    }
}

impl StateStore for MockStateStore {
    fn spire_dir(&self) -> &Path {
        self.spire_dir.path()
    }

    fn load_config(&self) -> CoreResult<Config> {
        Ok(self.config.borrow().clone())
    }

    fn is_sync_in_progress(&self) -> bool {
        self.checkpoint.borrow().is_some()
    }

    fn load_checkpoint(&self) -> CoreResult<SyncCheckpoint> {
        self.checkpoint
            .borrow()
            .clone()
            .ok_or(CoreError::NoSyncInProgress)
    }

    fn save_checkpoint(&self, checkpoint: &SyncCheckpoint) -> CoreResult<()> {
        *self.checkpoint.borrow_mut() = Some(checkpoint.clone());
        Ok(())
    }

    fn clear_checkpoint(&self) -> CoreResult<()> {
        *self.checkpoint.borrow_mut() = None;
        Ok(())
    }
}

/// In-memory GitHub with a fixed set of pull requests.
#[derive(Default)]
pub struct MockGitHubClient {
    pub prs: Mutex<Vec<PullRequest>>,
    pub updates: Mutex<Vec<(u64, String)>>,
}

impl MockGitHubClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pr(self, number: u64, head: &str, base: &str) -> Self {
        if let Ok(mut prs) = self.prs.lock() {
            prs.push(PullRequest {
                number,
                title: format!("PR #{number}"),
                state: PullRequestState::Open,
                head_branch: head.to_string(),
                base_branch: base.to_string(),
                html_url: format!("https://github.com/owner/repo/pull/{number}"),
                merge_commit_sha: None,
            });
        }
        self
    }

    pub fn with_merged_pr(self, number: u64, head: &str, base: &str, sha: &str) -> Self {
        let this = self.with_pr(number, head, base);
        if let Ok(mut prs) = this.prs.lock() {
            for pr in prs.iter_mut().filter(|pr| pr.number == number) {
                pr.state = PullRequestState::Merged;
                pr.merge_commit_sha = Some(sha.to_string());
            }
        }
        this
    }

    pub fn updates(&self) -> Vec<(u64, String)> {
        self.updates.lock().map(|u| u.clone()).unwrap_or_default()
    }
}

impl GitHubApi for MockGitHubClient {
    async fn list_prs_by_base(
        &self,
        _owner: &str,
        _repo: &str,
        base: &str,
    ) -> GitHubResult<Vec<PullRequest>> {
        let prs = self.prs.lock().map(|p| p.clone()).unwrap_or_default();
        Ok(prs
            .into_iter()
            .filter(|pr| pr.is_open() && pr.base_branch == base)
            .collect())
    }

    async fn get_pr(&self, _owner: &str, _repo: &str, number: u64) -> GitHubResult<PullRequest> {
        let prs = self.prs.lock().map(|p| p.clone()).unwrap_or_default();
        prs.into_iter()
            .find(|pr| pr.number == number)
            .ok_or(spire_github::Error::PrNotFound(number))
    }

    async fn update_pr_base(
        &self,
        _owner: &str,
        _repo: &str,
        number: u64,
        base: &str,
    ) -> GitHubResult<PullRequest> {
        if let Ok(mut updates) = self.updates.lock() {
            updates.push((number, base.to_string()));
        }
        let mut prs = self.prs.lock().map_err(|_| spire_github::Error::PrNotFound(number))?;
        let pr = prs
            .iter_mut()
            .find(|pr| pr.number == number)
            .ok_or(spire_github::Error::PrNotFound(number))?;
        pr.base_branch = base.to_string();
        Ok(pr.clone())
    }
}
