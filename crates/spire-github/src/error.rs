//! Error types for spire-github.

pub type Result<T> = std::result::Result<T, Error>;

/// Failures talking to the GitHub REST API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The token was rejected (HTTP 401).
    #[error("GitHub rejected the token - run `gh auth login` or set GITHUB_TOKEN")]
    Unauthorized,

    #[error("no GitHub token available - run `gh auth login` or set GITHUB_TOKEN")]
    NoToken,

    #[error("GitHub rate limit hit - retry later")]
    RateLimited,

    #[error("pull request #{0} does not exist")]
    PrNotFound(u64),

    /// Any other non-success status.
    #[error("GitHub returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("request to GitHub failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected GitHub response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Running `gh` failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
