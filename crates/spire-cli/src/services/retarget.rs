//! Retarget pull requests whose base branch was absorbed by a sync.
//!
//! Once a branch is fully absorbed into the new base, PRs that still target
//! it are pointed at the nearest surviving branch below it in the chain, or
//! at the stack base.

use std::collections::HashSet;

use anyhow::Result;
use spire_github::GitHubApi;

/// One PR whose base was changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retargeted {
    pub number: u64,
    pub head: String,
    pub from: String,
    pub to: String,
}

/// Service for PR retargeting with a trait-based GitHub client.
pub struct RetargetService<'a, H: GitHubApi> {
    client: &'a H,
    owner: String,
    repo_name: String,
}

/// New base for PRs targeting `branch`: the closest non-absorbed branch below
/// it, else the stack base.
pub fn surviving_base<'c>(
    base: &'c str,
    chain: &'c [String],
    absorbed: &HashSet<String>,
    branch: &str,
) -> &'c str {
    let below = chain.iter().take_while(|name| *name != branch);
    below
        .filter(|name| !absorbed.contains(*name))
        .last()
        .map_or(base, String::as_str)
}

#[allow(clippy::future_not_send)]
impl<'a, H: GitHubApi> RetargetService<'a, H> {
    #[must_use]
    pub const fn new(client: &'a H, owner: String, repo_name: String) -> Self {
        Self {
            client,
            owner,
            repo_name,
        }
    }

    /// Retarget every open PR based on an absorbed chain branch.
    ///
    /// PRs already on the right base are left alone.
    ///
    /// # Errors
    /// Returns the first API failure; PRs retargeted before it stay retargeted.
    pub async fn retarget(
        &self,
        base: &str,
        chain: &[String],
        absorbed: &HashSet<String>,
    ) -> Result<Vec<Retargeted>> {
        let mut done = Vec::new();

        for branch in chain.iter().filter(|b| absorbed.contains(*b)) {
            let target = surviving_base(base, chain, absorbed, branch);
            let prs = self
                .client
                .list_prs_by_base(&self.owner, &self.repo_name, branch)
                .await?;

            for pr in prs.into_iter().filter(|pr| pr.is_open()) {
                if pr.base_branch == target {
                    continue;
                }
                self.client
                    .update_pr_base(&self.owner, &self.repo_name, pr.number, target)
                    .await?;
                tracing::debug!(number = pr.number, from = %branch, to = %target, "retargeted");
                done.push(Retargeted {
                    number: pr.number,
                    head: pr.head_branch,
                    from: branch.clone(),
                    to: target.to_string(),
                });
            }
        }

        Ok(done)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::test_mocks::MockGitHubClient;

    fn chain() -> Vec<String> {
        vec!["b1".into(), "b2".into(), "b3".into()]
    }

    fn set(names: &[&str]) -> HashSet<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_surviving_base() {
        let chain = chain();
        assert_eq!(surviving_base("main", &chain, &set(&["b1"]), "b1"), "main");
        assert_eq!(surviving_base("main", &chain, &set(&["b2"]), "b2"), "b1");
        assert_eq!(
            surviving_base("main", &chain, &set(&["b1", "b2"]), "b2"),
            "main"
        );
    }

    #[tokio::test]
    async fn test_retargets_prs_on_absorbed_branch() {
        let client = MockGitHubClient::new()
            .with_pr(1, "b1", "main")
            .with_pr(2, "b2", "b1")
            .with_pr(3, "b3", "b2");
        let service = RetargetService::new(&client, "owner".into(), "repo".into());

        let done = service
            .retarget("main", &chain(), &set(&["b1"]))
            .await
            .unwrap();

        assert_eq!(
            done,
            vec![Retargeted {
                number: 2,
                head: "b2".into(),
                from: "b1".into(),
                to: "main".into(),
            }]
        );
        assert_eq!(client.updates(), vec![(2, "main".to_string())]);
    }

    #[tokio::test]
    async fn test_nothing_absorbed_means_no_calls() {
        let client = MockGitHubClient::new().with_pr(2, "b2", "b1");
        let service = RetargetService::new(&client, "owner".into(), "repo".into());

        let done = service
            .retarget("main", &chain(), &HashSet::new())
            .await
            .unwrap();
        assert!(done.is_empty());
        assert!(client.updates().is_empty());
    }
}
