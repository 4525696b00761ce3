//! GitHub API types.

use serde::{Deserialize, Serialize};

/// A GitHub Pull Request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub state: PullRequestState,

    /// Head branch name.
    pub head_branch: String,

    /// Base branch name.
    pub base_branch: String,

    pub html_url: String,

    /// Commit the PR landed as, once merged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_commit_sha: Option<String>,
}

impl PullRequest {
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == PullRequestState::Open
    }

    #[must_use]
    pub fn is_merged(&self) -> bool {
        self.state == PullRequestState::Merged
    }
}

/// State of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestState {
    Open,
    /// Closed without merging.
    Closed,
    Merged,
}

/// Request to update a pull request.
#[derive(Debug, Default, Serialize)]
pub struct UpdatePullRequest {
    /// New base branch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
}

impl UpdatePullRequest {
    #[must_use]
    pub fn retarget(base: impl Into<String>) -> Self {
        Self {
            base: Some(base.into()),
        }
    }
}
