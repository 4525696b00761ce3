//! Rewrite execution: move branch references to their planned tips.

use spire_git::GitOps;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::plan::{BranchUpdate, RewritePlan};

/// Branches moved by [`apply`], in chain order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedResult {
    pub moved: Vec<BranchUpdate>,
}

impl AppliedResult {
    #[must_use]
    pub fn moved_names(&self) -> Vec<String> {
        self.moved.iter().map(|u| u.branch.clone()).collect()
    }
}

/// Apply the branch moves of `plan`.
///
/// The plan is validated and every target commit checked for presence before
/// any reference moves. Moves then happen in chain order, each one
/// compare-and-swap against the branch's planned old tip. There is no
/// rollback: a failure reports exactly which branches moved.
///
/// # Errors
/// Returns `InvalidPlan` if validation fails (nothing moved),
/// `PartialRewrite` if a move fails, or `Cancelled` if cancellation was
/// requested between two moves.
pub fn apply<G: GitOps>(
    git: &G,
    plan: &RewritePlan,
    cancel: &CancelToken,
) -> Result<AppliedResult> {
    plan.validate()?;

    for target in plan.mapping.values() {
        if !git.commit_exists(*target) {
            return Err(Error::InvalidPlan(format!(
                "rewritten commit {target} is missing from the object store"
            )));
        }
    }

    let mut result = AppliedResult::default();
    for (index, update) in plan.updates.iter().enumerate() {
        if cancel.is_cancelled() {
            tracing::info!(moved = index, "cancelled between branch moves");
            return Err(Error::Cancelled {
                moved: result.moved_names(),
                pending: names(&plan.updates[index..]),
            });
        }

        if let Err(err) = git.move_branch(&update.branch, update.to, update.from) {
            tracing::warn!(branch = %update.branch, error = %err, "branch move failed");
            return Err(Error::PartialRewrite {
                moved: result.moved_names(),
                pending: names(&plan.updates[index + 1..]),
                failed: Some(update.branch.clone()),
                reason: err.to_string(),
            });
        }

        tracing::debug!(branch = %update.branch, from = %update.from, to = %update.to, "moved");
        result.moved.push(update.clone());
    }

    Ok(result)
}

fn names(updates: &[BranchUpdate]) -> Vec<String> {
    updates.iter().map(|u| u.branch.clone()).collect()
}
