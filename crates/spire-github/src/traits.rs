//! Trait abstraction for the GitHub API, so services can be tested against
//! an in-memory fake.

use std::future::Future;

use crate::{PullRequest, Result};

/// Pull request operations needed to keep a stack's PRs pointed at the right
/// base.
///
/// All methods take `owner` and `repo` to support operations across
/// repositories.
pub trait GitHubApi: Send + Sync {
    /// List open pull requests targeting `base`.
    fn list_prs_by_base(
        &self,
        owner: &str,
        repo: &str,
        base: &str,
    ) -> impl Future<Output = Result<Vec<PullRequest>>> + Send;

    /// Fetch one pull request, including whether and how it was merged.
    fn get_pr(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> impl Future<Output = Result<PullRequest>> + Send;

    /// Point a pull request at a new base branch.
    fn update_pr_base(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        base: &str,
    ) -> impl Future<Output = Result<PullRequest>> + Send;
}
