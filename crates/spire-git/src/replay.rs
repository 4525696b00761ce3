//! Single-commit replay ("rebase one commit onto a new parent").
//!
//! Replay is a three-way tree merge of the commit's change onto the new
//! parent, done in memory: no working tree, index or HEAD is touched, and the
//! resulting commit is written to the object store without any reference
//! pointing at it.

use git2::Oid;

use crate::Repository;
use crate::error::{Error, Result};

/// Outcome of replaying one commit onto a new parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Replay {
    /// The change applied cleanly, producing this new commit.
    Applied(Oid),

    /// The change is already contained in the new parent; no commit was made.
    Empty,

    /// The change cannot be applied without manual resolution.
    Conflict(Vec<String>),
}

impl Repository {
    /// Replay `commit` onto `onto`.
    ///
    /// The original author and message are kept; the committer is the
    /// configured identity (falling back to the original committer).
    /// Merge commits are replayed against their first parent.
    ///
    /// # Errors
    /// Returns error if either commit is missing or the merge fails to run.
    pub fn replay_commit(&self, commit: Oid, onto: Oid) -> Result<Replay> {
        let source = self
            .inner
            .find_commit(commit)
            .map_err(|_| Error::CommitNotFound(commit))?;
        let target = self
            .inner
            .find_commit(onto)
            .map_err(|_| Error::CommitNotFound(onto))?;

        let base_tree = if source.parent_count() > 0 {
            source.parent(0)?.tree()?
        } else {
            let empty = self.inner.treebuilder(None)?.write()?;
            self.inner.find_tree(empty)?
        };

        let mut index =
            self.inner
                .merge_trees(&base_tree, &target.tree()?, &source.tree()?, None)?;

        if index.has_conflicts() {
            let mut files = Vec::new();
            for conflict in index.conflicts()? {
                let conflict = conflict?;
                let entry = conflict.our.or(conflict.their).or(conflict.ancestor);
                if let Some(entry) = entry {
                    files.push(String::from_utf8_lossy(&entry.path).into_owned());
                }
            }
            files.sort();
            files.dedup();
            tracing::debug!(%commit, %onto, ?files, "replay conflict");
            return Ok(Replay::Conflict(files));
        }

        let tree_id = index.write_tree_to(&self.inner)?;
        if tree_id == target.tree_id() {
            tracing::debug!(%commit, %onto, "replay produced no change");
            return Ok(Replay::Empty);
        }

        let tree = self.inner.find_tree(tree_id)?;
        let committer = match self.inner.signature() {
            Ok(sig) => sig,
            Err(_) => source.committer().to_owned(),
        };
        let message = source.message_raw().unwrap_or_default();

        let new = self
            .inner
            .commit(None, &source.author(), &committer, message, &tree, &[&target])?;
        tracing::debug!(%commit, %onto, %new, "replayed commit");

        Ok(Replay::Applied(new))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::repository::tests::{checkout_new_branch, commit_file, init_test_repo};

    #[test]
    fn test_replay_applies_onto_new_parent() {
        let (_temp, repo) = init_test_repo();

        checkout_new_branch(&repo, "feature");
        let change = commit_file(&repo, "feature.txt", "feature", "add feature");

        repo.inner.set_head("refs/heads/main").unwrap();
        repo.inner
            .checkout_head(Some(git2::build::CheckoutBuilder::new().force()))
            .unwrap();
        let upstream = commit_file(&repo, "other.txt", "other", "upstream work");

        let Replay::Applied(new) = repo.replay_commit(change, upstream).unwrap() else {
            panic!("expected clean replay");
        };

        assert_ne!(new, change);
        assert_eq!(repo.commit_parents(new).unwrap(), vec![upstream]);
        let replayed = repo.inner.find_commit(new).unwrap();
        assert_eq!(replayed.message(), Some("add feature"));
        assert!(replayed.tree().unwrap().get_name("feature.txt").is_some());
        assert!(replayed.tree().unwrap().get_name("other.txt").is_some());
    }

    #[test]
    fn test_replay_detects_absorbed_change() {
        let (_temp, repo) = init_test_repo();
        let base = repo.branch_commit("main").unwrap();

        checkout_new_branch(&repo, "feature");
        let change = commit_file(&repo, "feature.txt", "feature", "add feature");

        // A squash of the same change on top of the base
        repo.inner.set_head("refs/heads/main").unwrap();
        repo.inner
            .checkout_head(Some(git2::build::CheckoutBuilder::new().force()))
            .unwrap();
        let squash = commit_file(&repo, "feature.txt", "feature", "squashed feature");
        assert_eq!(repo.commit_parents(squash).unwrap(), vec![base]);

        assert_eq!(repo.replay_commit(change, squash).unwrap(), Replay::Empty);
    }

    #[test]
    fn test_replay_reports_conflicting_files() {
        let (_temp, repo) = init_test_repo();

        checkout_new_branch(&repo, "feature");
        let change = commit_file(&repo, "shared.txt", "ours", "feature edit");

        repo.inner.set_head("refs/heads/main").unwrap();
        repo.inner
            .checkout_head(Some(git2::build::CheckoutBuilder::new().force()))
            .unwrap();
        let upstream = commit_file(&repo, "shared.txt", "theirs", "upstream edit");

        assert_eq!(
            repo.replay_commit(change, upstream).unwrap(),
            Replay::Conflict(vec!["shared.txt".to_string()])
        );
    }
}
