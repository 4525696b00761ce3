//! Find where a merged pull request landed, so a stack built on top of it
//! can be moved onto the merge.

use anyhow::{Result, bail};
use spire_github::GitHubApi;

/// Where a merged PR's changes now live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Landed {
    /// Branch the PR was merged into.
    pub base: String,
    /// Commit the PR landed as.
    pub commit: String,
}

/// Service for merged-PR lookups with a trait-based GitHub client.
pub struct LandedService<'a, H: GitHubApi> {
    client: &'a H,
    owner: String,
    repo_name: String,
}

#[allow(clippy::future_not_send)]
impl<'a, H: GitHubApi> LandedService<'a, H> {
    #[must_use]
    pub const fn new(client: &'a H, owner: String, repo_name: String) -> Self {
        Self {
            client,
            owner,
            repo_name,
        }
    }

    /// Base branch and landed commit of PR `number`.
    ///
    /// # Errors
    /// Fails if the PR is still open, was closed without merging, or the API
    /// call fails.
    pub async fn landed(&self, number: u64) -> Result<Landed> {
        let pr = self
            .client
            .get_pr(&self.owner, &self.repo_name, number)
            .await?;

        if !pr.is_merged() {
            bail!("pull request #{number} is not merged");
        }
        let Some(commit) = pr.merge_commit_sha else {
            bail!("GitHub reported no merge commit for pull request #{number}");
        };

        tracing::debug!(number, base = %pr.base_branch, %commit, "merged pull request");
        Ok(Landed {
            base: pr.base_branch,
            commit,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::test_mocks::MockGitHubClient;

    #[tokio::test]
    async fn test_merged_pr_gives_base_and_commit() {
        let client = MockGitHubClient::new().with_merged_pr(7, "b1", "main", "4f2a9c1d");
        let service = LandedService::new(&client, "owner".into(), "repo".into());

        let landed = service.landed(7).await.unwrap();
        assert_eq!(
            landed,
            Landed {
                base: "main".into(),
                commit: "4f2a9c1d".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_open_pr_is_refused() {
        let client = MockGitHubClient::new().with_pr(8, "b2", "b1");
        let service = LandedService::new(&client, "owner".into(), "repo".into());

        let err = service.landed(8).await.unwrap_err();
        assert!(err.to_string().contains("not merged"));
    }

    #[tokio::test]
    async fn test_missing_pr_is_an_error() {
        let client = MockGitHubClient::new();
        let service = LandedService::new(&client, "owner".into(), "repo".into());

        assert!(service.landed(9).await.is_err());
    }
}
