//! Remote synchronization with lease semantics.
//!
//! A branch is pushed only if the remote still points where this engine last
//! saw it. Every branch gets its own outcome; one stale or failing branch never
//! stops the others.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use spire_git::{Oid, RemoteOps};

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::lock::{LockKey, LockTable};

/// Last-observed remote tips, keyed by branch. `None` means "not on the remote".
pub type RemoteTips = HashMap<String, Option<Oid>>;

/// What happened to one branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// The remote now points at the local tip.
    Pushed { previous: Option<Oid>, tip: Oid },

    /// The remote already had the local tip.
    UpToDate,

    /// The remote moved since it was observed; nothing was pushed.
    Stale {
        expected: Option<Oid>,
        actual: Option<Oid>,
    },

    /// The push was attempted and failed.
    Failed(String),

    /// Not attempted because the run was cancelled.
    Skipped,
}

impl PushOutcome {
    /// Short status used in per-branch result lines.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Pushed { .. } => "pushed",
            Self::UpToDate => "up-to-date",
            Self::Stale { .. } => "STALE_REMOTE",
            Self::Failed(_) => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for PushOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            other => f.write_str(other.label()),
        }
    }
}

/// Outcome for one branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchPush {
    pub branch: String,
    #[serde(rename = "status", serialize_with = "serialize_outcome")]
    pub outcome: PushOutcome,
}

fn serialize_outcome<S: serde::Serializer>(
    outcome: &PushOutcome,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(outcome.label())
}

/// Per-branch outcomes of a push batch, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PushReport {
    pub results: Vec<BranchPush>,
}

impl PushReport {
    fn branches_where(&self, pred: impl Fn(&PushOutcome) -> bool) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| pred(&r.outcome))
            .map(|r| r.branch.clone())
            .collect()
    }

    #[must_use]
    pub fn pushed(&self) -> Vec<String> {
        self.branches_where(|o| matches!(o, PushOutcome::Pushed { .. }))
    }

    #[must_use]
    pub fn stale(&self) -> Vec<String> {
        self.branches_where(|o| matches!(o, PushOutcome::Stale { .. }))
    }

    #[must_use]
    pub fn failed(&self) -> Vec<String> {
        self.branches_where(|o| matches!(o, PushOutcome::Failed(_)))
    }

    #[must_use]
    pub fn skipped(&self) -> Vec<String> {
        self.branches_where(|o| matches!(o, PushOutcome::Skipped))
    }

    /// Check if every branch is pushed or already up to date.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.results
            .iter()
            .all(|r| matches!(r.outcome, PushOutcome::Pushed { .. } | PushOutcome::UpToDate))
    }

    #[must_use]
    pub fn outcome(&self, branch: &str) -> Option<&PushOutcome> {
        self.results
            .iter()
            .find(|r| r.branch == branch)
            .map(|r| &r.outcome)
    }
}

/// Pushes branches to one remote.
pub struct RemoteSynchronizer<'a, R: RemoteOps> {
    git: &'a R,
    remote: String,
    locks: &'a LockTable,
}

impl<'a, R: RemoteOps> RemoteSynchronizer<'a, R> {
    pub fn new(git: &'a R, remote: impl Into<String>, locks: &'a LockTable) -> Self {
        Self {
            git,
            remote: remote.into(),
            locks,
        }
    }

    #[must_use]
    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Last-known remote tips (the remote-tracking refs) for `branches`.
    ///
    /// # Errors
    /// Returns error if a tracking ref cannot be read.
    pub fn observe(&self, branches: &[String]) -> Result<RemoteTips> {
        let mut tips = RemoteTips::new();
        for branch in branches {
            let tip = self.git.tracking_commit(&self.remote, branch)?;
            tips.insert(branch.clone(), tip);
        }
        Ok(tips)
    }

    /// Push each branch whose remote tip still matches `expected`.
    ///
    /// A branch missing from `expected` is expected to be absent remotely.
    /// Cancellation is checked between branches; the rest are `Skipped`.
    pub fn push(
        &self,
        branches: &[String],
        expected: &RemoteTips,
        cancel: &CancelToken,
    ) -> PushReport {
        let mut report = PushReport::default();

        for branch in branches {
            let outcome = if cancel.is_cancelled() {
                PushOutcome::Skipped
            } else {
                match self.locks.acquire([LockKey::Remote(branch.clone())]) {
                    Ok(_guard) => self.push_one(branch, expected.get(branch).copied().flatten()),
                    Err(err) => PushOutcome::Failed(err.to_string()),
                }
            };

            match &outcome {
                PushOutcome::Pushed { tip, .. } => {
                    tracing::info!(branch = %branch, %tip, remote = %self.remote, "pushed");
                }
                PushOutcome::Stale { expected, actual } => {
                    tracing::warn!(
                        branch = %branch,
                        ?expected,
                        ?actual,
                        "remote moved, not pushing"
                    );
                }
                PushOutcome::Failed(reason) => {
                    tracing::warn!(branch = %branch, %reason, "push failed");
                }
                PushOutcome::UpToDate | PushOutcome::Skipped => {}
            }

            report.results.push(BranchPush {
                branch: branch.clone(),
                outcome,
            });
        }

        report
    }

    fn push_one(&self, branch: &str, expected: Option<Oid>) -> PushOutcome {
        let local = match self.git.branch_commit(branch) {
            Ok(tip) => tip,
            Err(err) => return PushOutcome::Failed(err.to_string()),
        };
        let actual = match self.git.fetch_remote_tip(&self.remote, branch) {
            Ok(tip) => tip,
            Err(err) => return PushOutcome::Failed(err.to_string()),
        };

        if actual == Some(local) {
            return PushOutcome::UpToDate;
        }
        if actual != expected {
            return PushOutcome::Stale { expected, actual };
        }

        match self.git.push_with_lease(&self.remote, branch, expected) {
            Ok(tip) => PushOutcome::Pushed {
                previous: expected,
                tip,
            },
            Err(spire_git::Error::StaleRemote { expected, actual, .. }) => {
                PushOutcome::Stale { expected, actual }
            }
            Err(err) => PushOutcome::Failed(err.to_string()),
        }
    }
}
