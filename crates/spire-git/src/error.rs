//! Error types for spire-git.

use git2::{ErrorClass, ErrorCode, Oid};

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during git operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Not inside a git repository.
    #[error("not a git repository")]
    NotARepository,

    /// Branch not found.
    #[error("branch not found: {0}")]
    BranchNotFound(String),

    /// Revision could not be resolved to a commit.
    #[error("revision not found: {0}")]
    RevisionNotFound(String),

    /// Commit not found in the object store.
    #[error("commit not found: {0}")]
    CommitNotFound(Oid),

    /// HEAD is detached (not on a branch).
    #[error("HEAD is detached - checkout a branch first")]
    DetachedHead,

    /// Working directory is dirty.
    #[error("working directory has uncommitted changes")]
    DirtyWorkingDirectory,

    /// A rebase or merge was started and not finished.
    #[error("a rebase or merge is in progress - finish or abort it first")]
    OperationInProgress,

    /// A branch no longer points where the caller expected it to.
    #[error("branch '{branch}' moved: expected {expected}, found {}", describe_tip(.actual.as_ref()))]
    RefMoved {
        branch: String,
        expected: Oid,
        actual: Option<Oid>,
    },

    /// Updating a branch reference failed.
    #[error("failed to update branch '{branch}': {message}")]
    RefUpdateFailed { branch: String, message: String },

    /// Remote not found.
    #[error("remote not found: {0}")]
    RemoteNotFound(String),

    /// Invalid remote URL.
    #[error("invalid remote URL: {0}")]
    InvalidRemoteUrl(String),

    /// The remote branch changed since it was last observed.
    #[error(
        "remote branch '{branch}' is stale: expected {}, found {}",
        describe_tip(.expected.as_ref()),
        describe_tip(.actual.as_ref())
    )]
    StaleRemote {
        branch: String,
        expected: Option<Oid>,
        actual: Option<Oid>,
    },

    /// The remote refused the reference update.
    #[error("push of '{branch}' rejected: {message}")]
    PushRejected { branch: String, message: String },

    /// Push failed.
    #[error("push failed: {0}")]
    PushFailed(String),

    /// Fetch failed.
    #[error("fetch failed: {0}")]
    FetchFailed(String),

    /// Underlying git2 error.
    #[error("git error: {0}")]
    Git2(#[from] git2::Error),
}

impl Error {
    /// Whether retrying the same read-only query may succeed.
    ///
    /// Lock contention and OS/network level failures are transient;
    /// everything else is a definite answer.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Git2(err) => {
                err.code() == ErrorCode::Locked
                    || matches!(err.class(), ErrorClass::Os | ErrorClass::Net)
            }
            Self::FetchFailed(_) => true,
            _ => false,
        }
    }
}

/// Render an optional tip for messages (`<none>` when the ref is absent).
fn describe_tip(tip: Option<&Oid>) -> String {
    tip.map_or_else(|| "<none>".to_string(), ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locked_is_transient() {
        let err = Error::Git2(git2::Error::new(
            ErrorCode::Locked,
            ErrorClass::Reference,
            "index.lock exists",
        ));
        assert!(err.is_transient());
    }

    #[test]
    fn test_not_found_is_not_transient() {
        let err = Error::Git2(git2::Error::new(
            ErrorCode::NotFound,
            ErrorClass::Reference,
            "no such ref",
        ));
        assert!(!err.is_transient());
        assert!(!Error::BranchNotFound("x".into()).is_transient());
    }

    #[test]
    fn test_stale_remote_message_handles_missing_tip() {
        let err = Error::StaleRemote {
            branch: "feature".into(),
            expected: None,
            actual: Some(Oid::zero()),
        };
        let msg = err.to_string();
        assert!(msg.contains("<none>"));
        assert!(msg.contains("feature"));
    }
}
