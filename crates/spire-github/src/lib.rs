//! # spire-github
//!
//! GitHub API integration for Spire: finding the pull requests of a stack
//! and pointing them at a new base once a lower branch has landed.
//!
//! # Security
//!
//! Authentication tokens are held in a `SecretString`, which zeroizes its
//! memory when dropped.

mod auth;
mod client;
mod error;
mod traits;
mod types;

pub use auth::Auth;
pub use client::GitHubClient;
pub use error::{Error, Result};
// Re-export SecretString for constructing Auth::Token
pub use secrecy::SecretString;
pub use traits::GitHubApi;
pub use types::{PullRequest, PullRequestState, UpdatePullRequest};
