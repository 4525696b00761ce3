//! Where the GitHub token comes from.

use std::env;
use std::process::Command;

use secrecy::SecretString;

use crate::error::{Error, Result};

const TOKEN_VAR: &str = "GITHUB_TOKEN";

/// Token source.
#[derive(Debug, Clone)]
pub enum Auth {
    /// `gh auth token`.
    GhCli,

    /// A named environment variable.
    EnvVar(String),

    /// A token already in hand.
    Token(SecretString),
}

impl Auth {
    /// `GITHUB_TOKEN` when it is set, else the gh CLI.
    #[must_use]
    pub fn auto() -> Self {
        match env::var_os(TOKEN_VAR) {
            Some(_) => Self::EnvVar(TOKEN_VAR.into()),
            None => Self::GhCli,
        }
    }

    /// Produce the token.
    ///
    /// # Errors
    /// Returns `NoToken` when the source is empty or `gh` isn't logged in,
    /// and `Io` when `gh` can't be run.
    pub fn resolve(&self) -> Result<SecretString> {
        let raw = match self {
            Self::Token(token) => return Ok(token.clone()),
            Self::EnvVar(var) => env::var(var).unwrap_or_default(),
            Self::GhCli => gh_token()?,
        };
        non_empty(&raw)
    }
}

fn gh_token() -> Result<String> {
    let output = Command::new("gh").args(["auth", "token"]).output()?;
    if !output.status.success() {
        tracing::debug!(status = %output.status, "gh auth token failed");
        return Err(Error::NoToken);
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn non_empty(raw: &str) -> Result<SecretString> {
    match raw.trim() {
        "" => Err(Error::NoToken),
        token => Ok(SecretString::from(token.to_string())),
    }
}
