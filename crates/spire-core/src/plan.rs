//! Rewrite planning: replay each branch's unique commits onto its new parent.
//!
//! Planning writes replayed commits into the object store but never moves a
//! reference, so abandoning a plan (conflict, cancellation, error) leaves the
//! repository's branches exactly as they were.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use spire_git::{GitOps, Oid, Replay};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::inspector::HistoryInspector;
use crate::stack::{ChainBranch, DependencyChain};

/// One branch reference move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchUpdate {
    pub branch: String,

    #[serde(with = "crate::serde_oid")]
    pub from: Oid,

    #[serde(with = "crate::serde_oid")]
    pub to: Oid,

    /// Every unique commit of the branch was already in its new parent.
    #[serde(default)]
    pub absorbed: bool,
}

/// Where planning stopped for manual resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedConflict {
    pub branch: String,

    /// The first commit that could not be replayed.
    #[serde(with = "crate::serde_oid")]
    pub commit: Oid,

    /// The parent it was being replayed onto.
    #[serde(with = "crate::serde_oid")]
    pub onto: Oid,

    pub files: Vec<String>,
}

impl PlannedConflict {
    /// This conflict as an error.
    #[must_use]
    pub fn to_error(&self) -> Error {
        Error::Conflict {
            branch: self.branch.clone(),
            commit: self.commit,
            files: self.files.clone(),
        }
    }
}

/// Where to continue planning from: the previous branch's tip before and
/// after rewriting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanCursor {
    pub original: Oid,
    pub rewritten: Oid,
}

/// The rewrite of a chain onto a new base.
#[derive(Debug, Clone, Default)]
pub struct RewritePlan {
    /// Branches covered by this plan, bottom to top.
    pub chain: Vec<String>,

    /// Old commit to new commit. Dropped commits map to their new parent.
    pub mapping: HashMap<Oid, Oid>,

    /// Branch moves, in chain order.
    pub updates: Vec<BranchUpdate>,

    /// Branches that already sit on their new parent.
    pub unchanged: Vec<String>,

    /// Branches not planned because of `conflict`.
    pub pending: Vec<String>,

    pub conflict: Option<PlannedConflict>,
}

impl RewritePlan {
    /// Check if every branch was planned.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.conflict.is_none()
    }

    /// Check if the plan moves nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.updates.is_empty()
    }

    /// Check that the plan covers every branch of its chain exactly once and
    /// that every move is backed by the mapping.
    ///
    /// # Errors
    /// Returns `InvalidPlan` describing the first inconsistency.
    pub fn validate(&self) -> Result<()> {
        for update in &self.updates {
            if self.mapping.get(&update.from) != Some(&update.to) {
                return Err(Error::InvalidPlan(format!(
                    "move of '{}' to {} is not backed by the commit mapping",
                    update.branch, update.to
                )));
            }
        }

        let mut seen = HashSet::new();
        let covered = self
            .updates
            .iter()
            .map(|u| &u.branch)
            .chain(&self.unchanged)
            .chain(&self.pending);
        for branch in covered {
            if !seen.insert(branch.as_str()) {
                return Err(Error::InvalidPlan(format!("'{branch}' is planned twice")));
            }
            if !self.chain.contains(branch) {
                return Err(Error::InvalidPlan(format!("'{branch}' is not in the stack")));
            }
        }

        if let Some(missing) = self.chain.iter().find(|b| !seen.contains(b.as_str())) {
            return Err(Error::InvalidPlan(format!(
                "'{missing}' would be left on rewritten history"
            )));
        }
        if self.conflict.is_some() == self.pending.is_empty() {
            return Err(Error::InvalidPlan(
                "pending branches and conflict disagree".to_string(),
            ));
        }

        Ok(())
    }
}

/// Plan moving `chain` from its base onto `new_base`.
///
/// # Errors
/// Returns `Cancelled` if cancellation is requested, or a git error.
pub fn plan_rewrite<G: GitOps>(
    inspector: &HistoryInspector<'_, G>,
    chain: &DependencyChain,
    new_base: Oid,
    cancel: &CancelToken,
) -> Result<RewritePlan> {
    let cursor = PlanCursor {
        original: chain.base_tip,
        rewritten: new_base,
    };
    plan_from(inspector, &chain.branches, cursor, cancel)
}

/// Plan `branches` starting from `cursor`.
///
/// Used directly when resuming: the cursor is then the conflicting branch's
/// original tip and its manually resolved tip.
///
/// # Errors
/// Returns `Cancelled` if cancellation is requested, or a git error.
pub fn plan_from<G: GitOps>(
    inspector: &HistoryInspector<'_, G>,
    branches: &[ChainBranch],
    mut cursor: PlanCursor,
    cancel: &CancelToken,
) -> Result<RewritePlan> {
    let git = inspector.git();
    let mut plan = RewritePlan {
        chain: branches.iter().map(|b| b.name.clone()).collect(),
        ..RewritePlan::default()
    };

    for (index, branch) in branches.iter().enumerate() {
        cancel.check()?;

        if inspector.is_ancestor(cursor.rewritten, branch.tip)? {
            tracing::debug!(branch = %branch.name, "already on its new parent");
            plan.unchanged.push(branch.name.clone());
            cursor = PlanCursor {
                original: branch.tip,
                rewritten: branch.tip,
            };
            continue;
        }

        let mut onto = cursor.rewritten;
        let unique = inspector.unique_commits(cursor.original, branch.tip)?;
        for &commit in &unique {
            cancel.check()?;

            if inspector.parents(commit)?.first() == Some(&onto) {
                plan.mapping.insert(commit, commit);
                onto = commit;
                continue;
            }

            match git.replay_commit(commit, onto)? {
                Replay::Applied(new) => {
                    tracing::debug!(branch = %branch.name, %commit, %new, "replayed");
                    plan.mapping.insert(commit, new);
                    onto = new;
                }
                Replay::Empty => {
                    tracing::debug!(branch = %branch.name, %commit, "dropped, already upstream");
                    plan.mapping.insert(commit, onto);
                }
                Replay::Conflict(files) => {
                    tracing::info!(branch = %branch.name, %commit, "conflict, planning halted");
                    plan.pending = branches[index..].iter().map(|b| b.name.clone()).collect();
                    plan.conflict = Some(PlannedConflict {
                        branch: branch.name.clone(),
                        commit,
                        onto,
                        files,
                    });
                    return Ok(plan);
                }
            }
        }

        plan.mapping.entry(branch.tip).or_insert(onto);
        if onto == branch.tip {
            plan.unchanged.push(branch.name.clone());
        } else {
            plan.updates.push(BranchUpdate {
                branch: branch.name.clone(),
                from: branch.tip,
                to: onto,
                // A branch with no commits of its own only aliases the one below
                absorbed: !unique.is_empty() && onto == cursor.rewritten,
            });
        }
        cursor = PlanCursor {
            original: branch.tip,
            rewritten: onto,
        };
    }

    Ok(plan)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::resolver::resolve_stack;
    use spire_git::MemoryRepo;

    struct Fixture {
        repo: MemoryRepo,
        base: Oid,
        squash: Oid,
    }

    /// `main <- b1 <- b2 <- b3`; `squash` is b1's change landed on `main`.
    fn squashed_stack(b2_content: &str) -> Fixture {
        let repo = MemoryRepo::new();
        let base = repo.commit(&[], &[("README.md", Some("hi"))], "init");
        let c1 = repo.commit(&[base], &[("one", Some("1"))], "b1 work");
        let c2 = repo.commit(&[c1], &[("two", Some(b2_content))], "b2 work");
        let c3 = repo.commit(&[c2], &[("three", Some("3"))], "b3 work");
        let squash = repo.commit(&[base], &[("one", Some("1")), ("two", Some("main"))], "squash");
        repo.set_branch("main", squash);
        repo.set_branch("b1", c1);
        repo.set_branch("b2", c2);
        repo.set_branch("b3", c3);
        Fixture { repo, base, squash }
    }

    fn plan_for(fixture: &Fixture) -> (DependencyChain, RewritePlan) {
        let inspector = HistoryInspector::new(&fixture.repo);
        let chain = resolve_stack(&inspector, "main", "b3").unwrap();
        assert_eq!(chain.base_tip, fixture.base);
        let plan = plan_rewrite(&inspector, &chain, fixture.squash, &CancelToken::new()).unwrap();
        (chain, plan)
    }

    #[test]
    fn test_squashed_bottom_is_absorbed() {
        let fixture = squashed_stack("main");
        let (chain, plan) = plan_for(&fixture);

        plan.validate().unwrap();
        assert!(plan.is_complete());
        assert_eq!(plan.updates.len(), 3);

        let b1 = &plan.updates[0];
        assert_eq!(b1.branch, "b1");
        assert_eq!(b1.to, fixture.squash);
        assert!(b1.absorbed);

        // b2's change also matches what landed, so only b3 keeps a commit
        assert!(plan.updates[1].absorbed);
        let b3 = &plan.updates[2];
        assert!(!b3.absorbed);
        assert_ne!(b3.to, chain.branches[2].tip);
        assert_eq!(fixture.repo.commit_parents(b3.to).unwrap(), vec![fixture.squash]);
    }

    #[test]
    fn test_alias_branch_is_not_absorbed() {
        let fixture = squashed_stack("main");
        let repo = &fixture.repo;
        repo.set_branch("b1-alias", repo.branch("b1").unwrap());

        let (chain, plan) = plan_for(&fixture);
        plan.validate().unwrap();
        assert_eq!(chain.names()[..2], ["b1", "b1-alias"]);

        let alias = plan.updates.iter().find(|u| u.branch == "b1-alias").unwrap();
        assert_eq!(alias.to, fixture.squash);
        assert!(!alias.absorbed);
        assert!(plan.updates[0].absorbed);
    }

    #[test]
    fn test_dependents_are_replayed_with_new_ids() {
        let fixture = squashed_stack("2");
        let repo = &fixture.repo;
        // Let b2's content differ from the squash without touching the same file
        let c1 = repo.branch("b1").unwrap();
        let c2 = repo.commit(&[c1], &[("two-b", Some("2"))], "b2 work");
        let c3 = repo.commit(&[c2], &[("three", Some("3"))], "b3 work");
        repo.set_branch("b2", c2);
        repo.set_branch("b3", c3);

        let (_, plan) = plan_for(&fixture);
        plan.validate().unwrap();

        let b2 = &plan.updates[1];
        let b3 = &plan.updates[2];
        assert!(!b2.absorbed);
        assert_eq!(repo.commit_parents(b2.to).unwrap(), vec![fixture.squash]);
        assert_eq!(repo.commit_parents(b3.to).unwrap(), vec![b2.to]);
        assert_eq!(repo.message(b3.to).as_deref(), Some("b3 work"));
        for update in &plan.updates {
            assert!(repo.is_ancestor(fixture.squash, update.to).unwrap());
        }
    }

    #[test]
    fn test_conflict_halts_and_keeps_lower_branches() {
        let fixture = squashed_stack("2");
        let (_, plan) = plan_for(&fixture);

        plan.validate().unwrap();
        assert!(!plan.is_complete());
        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.updates[0].branch, "b1");
        assert_eq!(plan.pending, vec!["b2", "b3"]);

        let conflict = plan.conflict.as_ref().unwrap();
        assert_eq!(conflict.branch, "b2");
        assert_eq!(conflict.onto, fixture.squash);
        assert_eq!(conflict.files, vec!["two"]);
        assert!(matches!(conflict.to_error(), Error::Conflict { branch, .. } if branch == "b2"));
    }

    #[test]
    fn test_already_rebased_stack_is_noop() {
        let fixture = squashed_stack("main");
        let inspector = HistoryInspector::new(&fixture.repo);
        let (_, plan) = plan_for(&fixture);
        for update in &plan.updates {
            fixture
                .repo
                .move_branch(&update.branch, update.to, update.from)
                .unwrap();
        }

        let chain = resolve_stack(&inspector, "main", "b3").unwrap();
        let again = plan_rewrite(&inspector, &chain, fixture.squash, &CancelToken::new()).unwrap();

        again.validate().unwrap();
        assert!(again.is_noop());
        assert_eq!(again.unchanged, vec!["b1", "b2", "b3"]);
    }

    #[test]
    fn test_unmoved_base_keeps_commits() {
        let fixture = squashed_stack("2");
        let inspector = HistoryInspector::new(&fixture.repo);
        let chain = resolve_stack(&inspector, &fixture.base.to_string(), "b3").unwrap();

        let plan = plan_rewrite(&inspector, &chain, fixture.base, &CancelToken::new()).unwrap();
        assert!(plan.is_noop());
        assert_eq!(plan.unchanged.len(), 3);
    }

    #[test]
    fn test_cancelled_planning_moves_nothing() {
        let fixture = squashed_stack("main");
        let inspector = HistoryInspector::new(&fixture.repo);
        let chain = resolve_stack(&inspector, "main", "b3").unwrap();
        let before = fixture.repo.branch("b3");

        let cancel = CancelToken::new();
        cancel.cancel();
        let err = plan_rewrite(&inspector, &chain, fixture.squash, &cancel).unwrap_err();

        assert!(matches!(err, Error::Cancelled { .. }));
        assert_eq!(fixture.repo.branch("b3"), before);
    }

    #[test]
    fn test_validate_rejects_uncovered_branch() {
        let fixture = squashed_stack("main");
        let (_, mut plan) = plan_for(&fixture);

        plan.updates.pop();
        assert!(matches!(plan.validate(), Err(Error::InvalidPlan(_))));
    }

    #[test]
    fn test_merge_commits_are_linearised() {
        let repo = MemoryRepo::new();
        let base = repo.commit(&[], &[("README.md", Some("hi"))], "init");
        let work = repo.commit(&[base], &[("a", Some("1"))], "work");
        let side = repo.commit(&[base], &[("s", Some("1"))], "side");
        let merge = repo.commit(&[work, side], &[("s", Some("1"))], "merge side");
        let upstream = repo.commit(&[base], &[("u", Some("1"))], "upstream");
        repo.set_branch("main", base);
        repo.set_branch("feature", merge);

        let inspector = HistoryInspector::new(&repo);
        let chain = resolve_stack(&inspector, "main", "feature").unwrap();
        let plan = plan_rewrite(&inspector, &chain, upstream, &CancelToken::new()).unwrap();
        plan.validate().unwrap();

        let tip = plan.updates[0].to;
        assert_eq!(repo.commit_parents(tip).unwrap().len(), 1);
        let files = repo.files(tip);
        for file in ["a", "s", "u"] {
            assert!(files.contains_key(file), "missing {file}");
        }
    }
}
