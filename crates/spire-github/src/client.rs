//! GitHub API client.

use reqwest::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use crate::auth::Auth;
use crate::error::{Error, Result};
use crate::traits::GitHubApi;
use crate::types::{PullRequest, PullRequestState, UpdatePullRequest};

/// A PR as returned by the REST API.
#[derive(serde::Deserialize)]
struct ApiPullRequest {
    number: u64,
    title: String,
    state: String,
    /// GitHub reports merged PRs as state="closed" plus `merged_at`.
    merged_at: Option<String>,
    /// Test-merge commit while open; the landed commit once merged.
    merge_commit_sha: Option<String>,
    html_url: String,
    head: ApiBranch,
    base: ApiBranch,
}

#[derive(serde::Deserialize)]
struct ApiBranch {
    #[serde(rename = "ref")]
    ref_name: String,
}

impl ApiPullRequest {
    fn into_pull_request(self) -> PullRequest {
        let state = if self.merged_at.is_some() {
            PullRequestState::Merged
        } else if self.state == "open" {
            PullRequestState::Open
        } else {
            PullRequestState::Closed
        };

        let merge_commit_sha = self
            .merge_commit_sha
            .filter(|_| state == PullRequestState::Merged);

        PullRequest {
            number: self.number,
            title: self.title,
            state,
            head_branch: self.head.ref_name,
            base_branch: self.base.ref_name,
            html_url: self.html_url,
            merge_commit_sha,
        }
    }
}

/// GitHub API client.
pub struct GitHubClient {
    client: Client,
    base_url: String,
    token: SecretString,
}

impl GitHubClient {
    /// Default GitHub API URL.
    pub const DEFAULT_API_URL: &'static str = "https://api.github.com";

    /// Create a new GitHub client.
    ///
    /// # Errors
    /// Returns error if authentication fails.
    pub fn new(auth: &Auth) -> Result<Self> {
        Self::with_base_url(auth, Self::DEFAULT_API_URL)
    }

    /// Create a new GitHub client with a custom API URL (for GitHub Enterprise).
    ///
    /// # Errors
    /// Returns error if authentication fails.
    pub fn with_base_url(auth: &Auth, base_url: impl Into<String>) -> Result<Self> {
        let token = auth.resolve()?;

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("spire-cli"));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );

        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token.expose_secret())
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%url, "GET");
        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, self.bearer())
            .send()
            .await?;

        Self::handle_response(response).await
    }

    async fn patch<T: DeserializeOwned, B: serde::Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%url, "PATCH");
        let response = self
            .client
            .patch(&url)
            .header(AUTHORIZATION, self.bearer())
            .json(body)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            let body = response.json().await?;
            return Ok(body);
        }

        let status_code = status.as_u16();
        match status_code {
            401 => Err(Error::Unauthorized),
            403 if response
                .headers()
                .get("x-ratelimit-remaining")
                .is_some_and(|v| v == "0") =>
            {
                Err(Error::RateLimited)
            }
            _ => {
                let text = response.text().await.unwrap_or_default();
                Err(Error::Api {
                    status: status_code,
                    message: text,
                })
            }
        }
    }

    /// List open PRs whose base is `base`.
    ///
    /// # Errors
    /// Returns error if API call fails.
    pub async fn list_prs_by_base(
        &self,
        owner: &str,
        repo: &str,
        base: &str,
    ) -> Result<Vec<PullRequest>> {
        let prs: Vec<ApiPullRequest> = self
            .get(&format!(
                "/repos/{owner}/{repo}/pulls?base={base}&state=open&per_page=100"
            ))
            .await?;

        Ok(prs
            .into_iter()
            .map(ApiPullRequest::into_pull_request)
            .collect())
    }

    /// Get a PR by number.
    ///
    /// # Errors
    /// Returns `PrNotFound` for a 404, or the API error.
    pub async fn get_pr(&self, owner: &str, repo: &str, number: u64) -> Result<PullRequest> {
        let api_pr: ApiPullRequest = self
            .get(&format!("/repos/{owner}/{repo}/pulls/{number}"))
            .await
            .map_err(|e| match e {
                Error::Api { status: 404, .. } => Error::PrNotFound(number),
                other => other,
            })?;

        Ok(api_pr.into_pull_request())
    }

    /// Change a PR's base branch.
    ///
    /// # Errors
    /// Returns `PrNotFound` for a 404, or the API error.
    pub async fn update_pr_base(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        base: &str,
    ) -> Result<PullRequest> {
        let api_pr: ApiPullRequest = self
            .patch(
                &format!("/repos/{owner}/{repo}/pulls/{number}"),
                &UpdatePullRequest::retarget(base),
            )
            .await
            .map_err(|e| match e {
                Error::Api { status: 404, .. } => Error::PrNotFound(number),
                other => other,
            })?;

        tracing::info!(number, %base, "retargeted pull request");
        Ok(api_pr.into_pull_request())
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("base_url", &self.base_url)
            .field("token", &"[redacted]")
            .finish_non_exhaustive()
    }
}

impl GitHubApi for GitHubClient {
    async fn list_prs_by_base(
        &self,
        owner: &str,
        repo: &str,
        base: &str,
    ) -> Result<Vec<PullRequest>> {
        self.list_prs_by_base(owner, repo, base).await
    }

    async fn get_pr(&self, owner: &str, repo: &str, number: u64) -> Result<PullRequest> {
        self.get_pr(owner, repo, number).await
    }

    async fn update_pr_base(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        base: &str,
    ) -> Result<PullRequest> {
        self.update_pr_base(owner, repo, number, base).await
    }
}
