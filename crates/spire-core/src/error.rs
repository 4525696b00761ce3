//! Error types for spire-core.

use std::fmt;
use std::path::PathBuf;

use spire_git::Oid;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in spire-core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Not inside a Git repository.
    #[error("not a git repository (or any parent up to mount point)")]
    NotARepository,

    /// A branch or revision could not be resolved.
    #[error("unknown branch: {0}")]
    UnknownBranch(String),

    /// Two points expected to be ancestor-related are not.
    #[error("'{ancestor}' is not an ancestor of '{descendant}'")]
    NotAncestor { ancestor: String, descendant: String },

    /// No branch sits between the base and the head.
    #[error("no branches between '{base}' and '{head}'")]
    EmptyStack { base: String, head: String },

    /// The stack head cannot be inferred.
    #[error("several stacks start at '{base}' ({}) - pass --head", .candidates.join(", "))]
    AmbiguousStack {
        base: String,
        candidates: Vec<String>,
    },

    /// Replaying a commit needs manual resolution.
    #[error("conflict replaying {commit} on '{branch}' ({})", .files.join(", "))]
    Conflict {
        branch: String,
        commit: Oid,
        files: Vec<String>,
    },

    /// A plan leaves the stack inconsistent.
    #[error("invalid rewrite plan: {0}")]
    InvalidPlan(String),

    /// Branch moves stopped part way through.
    #[error("rewrite stopped at {}: {reason}", .failed.as_deref().unwrap_or("<none>"))]
    PartialRewrite {
        moved: Vec<String>,
        pending: Vec<String>,
        failed: Option<String>,
        reason: String,
    },

    /// One or more remote branches moved since they were last observed.
    #[error("remote changed since last observed: {}", .branches.join(", "))]
    StaleRemote { branches: Vec<String> },

    /// The run was cancelled before completing.
    #[error("cancelled")]
    Cancelled {
        moved: Vec<String>,
        pending: Vec<String>,
    },

    /// A previous sync is waiting for conflict resolution.
    #[error("sync already in progress - run `spire sync-stack --resume` or `spire sync-stack --abort`")]
    SyncInProgress,

    /// Nothing to resume or abort.
    #[error("no sync in progress")]
    NoSyncInProgress,

    /// The chain kept gaining branches while its locks were being taken.
    #[error("stack kept changing while waiting for branch locks: {}", .0.join(", "))]
    StackChanged(Vec<String>),

    /// The repository no longer matches a saved checkpoint.
    #[error("checkpoint no longer matches the repository: {0}")]
    CheckpointMismatch(String),

    /// A push batch had per-branch failures.
    #[error("push failed for: {}", .branches.join(", "))]
    PushFailed { branches: Vec<String> },

    /// State file parsing error.
    #[error("failed to parse {file}: {message}")]
    StateParseError { file: PathBuf, message: String },

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error.
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Git operation error.
    #[error("git error: {0}")]
    Git(#[from] spire_git::Error),
}

impl Error {
    /// Cancellation before anything moved.
    #[must_use]
    pub const fn cancelled() -> Self {
        Self::Cancelled {
            moved: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// Machine-readable classification of this error.
    #[must_use]
    pub const fn reason(&self) -> ReasonCode {
        match self {
            Self::UnknownBranch(_)
            | Self::Git(
                spire_git::Error::BranchNotFound(_) | spire_git::Error::RevisionNotFound(_),
            ) => ReasonCode::UnknownBranch,
            Self::NotAncestor { .. } => ReasonCode::NotAncestor,
            Self::EmptyStack { .. } => ReasonCode::EmptyStack,
            Self::AmbiguousStack { .. } => ReasonCode::AmbiguousStack,
            Self::Conflict { .. } => ReasonCode::Conflict,
            Self::PartialRewrite { .. } => ReasonCode::PartialRewrite,
            Self::StaleRemote { .. } | Self::Git(spire_git::Error::StaleRemote { .. }) => {
                ReasonCode::StaleRemote
            }
            Self::Cancelled { .. } => ReasonCode::Cancelled,
            _ => ReasonCode::Error,
        }
    }
}

/// Reason codes reported by the CLI, each with a distinct exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReasonCode {
    Conflict,
    StaleRemote,
    PartialRewrite,
    UnknownBranch,
    NotAncestor,
    EmptyStack,
    AmbiguousStack,
    Cancelled,
    Error,
}

impl ReasonCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Conflict => "CONFLICT",
            Self::StaleRemote => "STALE_REMOTE",
            Self::PartialRewrite => "PARTIAL_REWRITE",
            Self::UnknownBranch => "UNKNOWN_BRANCH",
            Self::NotAncestor => "NOT_ANCESTOR",
            Self::EmptyStack => "EMPTY_STACK",
            Self::AmbiguousStack => "AMBIGUOUS_STACK",
            Self::Cancelled => "CANCELLED",
            Self::Error => "ERROR",
        }
    }

    /// Process exit status for this reason.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Conflict => 2,
            Self::StaleRemote => 3,
            Self::PartialRewrite => 4,
            Self::UnknownBranch => 5,
            Self::NotAncestor => 6,
            Self::EmptyStack => 7,
            Self::AmbiguousStack => 8,
            Self::Cancelled => 130,
            Self::Error => 1,
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_lookup_errors_map_to_unknown_branch() {
        let err = Error::from(spire_git::Error::BranchNotFound("b9".into()));
        assert_eq!(err.reason(), ReasonCode::UnknownBranch);
        assert_eq!(err.reason().exit_code(), 5);
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let codes = [
            ReasonCode::Conflict,
            ReasonCode::StaleRemote,
            ReasonCode::PartialRewrite,
            ReasonCode::UnknownBranch,
            ReasonCode::NotAncestor,
            ReasonCode::EmptyStack,
            ReasonCode::AmbiguousStack,
            ReasonCode::Cancelled,
            ReasonCode::Error,
        ];
        let mut seen: Vec<i32> = codes.iter().map(|c| c.exit_code()).collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), codes.len());
        assert!(!seen.contains(&0));
    }

    #[test]
    fn test_conflict_message_lists_files() {
        let err = Error::Conflict {
            branch: "b2".into(),
            commit: Oid::zero(),
            files: vec!["a.txt".into(), "b.txt".into()],
        };
        assert!(err.to_string().contains("a.txt, b.txt"));
        assert_eq!(err.reason().as_str(), "CONFLICT");
    }
}
