//! Read-only queries over the commit graph.
//!
//! Every query goes through [`HistoryInspector::read`], which retries
//! transient failures (a locked repository, OS or network hiccups). Nothing
//! here mutates the repository, so a retry can never compound damage.

use std::thread;
use std::time::Duration;

use spire_git::{GitOps, Oid};

use crate::error::{Error, Result};

/// Default number of attempts for a read-only query.
pub const DEFAULT_READ_RETRIES: u32 = 3;

/// Observational access to a repository.
#[derive(Debug)]
pub struct HistoryInspector<'a, G: GitOps> {
    git: &'a G,
    attempts: u32,
    backoff: Duration,
}

impl<'a, G: GitOps> HistoryInspector<'a, G> {
    pub const fn new(git: &'a G) -> Self {
        Self {
            git,
            attempts: DEFAULT_READ_RETRIES,
            backoff: Duration::from_millis(25),
        }
    }

    /// Override the number of attempts (at least one is always made).
    #[must_use]
    pub const fn with_retries(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// The underlying repository.
    pub const fn git(&self) -> &'a G {
        self.git
    }

    /// Whether `ancestor` is reachable from `descendant` (reflexive).
    ///
    /// # Errors
    /// Returns error if either commit is missing.
    pub fn is_ancestor(&self, ancestor: Oid, descendant: Oid) -> Result<bool> {
        self.read("is_ancestor", || self.git.is_ancestor(ancestor, descendant))
    }

    /// Number of commits reachable from `tip` but not from `base`.
    ///
    /// # Errors
    /// Returns `NotAncestor` if `base` is not an ancestor of `tip`.
    pub fn ancestor_count(&self, base: Oid, tip: Oid) -> Result<usize> {
        if !self.is_ancestor(base, tip)? {
            return Err(Error::NotAncestor {
                ancestor: base.to_string(),
                descendant: tip.to_string(),
            });
        }
        self.read("ancestor_count", || self.git.count_commits_between(base, tip))
    }

    /// Current tip of a local branch.
    ///
    /// # Errors
    /// Returns `UnknownBranch` if the branch does not exist.
    pub fn tip_of(&self, branch: &str) -> Result<Oid> {
        self.read("tip_of", || self.git.branch_commit(branch))
            .map_err(|err| unknown_branch(err, branch))
    }

    /// Resolve a branch name or commit-ish.
    ///
    /// # Errors
    /// Returns `UnknownBranch` if nothing matches.
    pub fn resolve_revision(&self, rev: &str) -> Result<Oid> {
        self.read("resolve_revision", || self.git.resolve_revision(rev))
            .map_err(|err| unknown_branch(err, rev))
    }

    /// All local branch names.
    ///
    /// # Errors
    /// Returns error if the branch list cannot be read.
    pub fn list_branches(&self) -> Result<Vec<String>> {
        self.read("list_branches", || self.git.list_branches())
    }

    /// Commits reachable from `to` but not from `from`, oldest first.
    ///
    /// # Errors
    /// Returns error if the walk fails.
    pub fn unique_commits(&self, from: Oid, to: Oid) -> Result<Vec<Oid>> {
        self.read("unique_commits", || self.git.commits_between(from, to))
    }

    /// Parents of a commit, first parent first.
    ///
    /// # Errors
    /// Returns error if the commit is missing.
    pub fn parents(&self, commit: Oid) -> Result<Vec<Oid>> {
        self.read("parents", || self.git.commit_parents(commit))
    }

    /// Best common ancestor of two commits, if any.
    ///
    /// # Errors
    /// Returns error if either commit is missing.
    pub fn merge_base(&self, a: Oid, b: Oid) -> Result<Option<Oid>> {
        self.read("merge_base", || self.git.merge_base(a, b))
    }

    /// Run a query, retrying transient failures with a short linear backoff.
    fn read<T>(&self, query: &str, op: impl Fn() -> spire_git::Result<T>) -> Result<T> {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < attempts => {
                    tracing::warn!(query, attempt, error = %err, "transient failure, retrying");
                    thread::sleep(self.backoff * attempt);
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

fn unknown_branch(err: Error, name: &str) -> Error {
    match err {
        Error::Git(spire_git::Error::BranchNotFound(_) | spire_git::Error::RevisionNotFound(_)) => {
            Error::UnknownBranch(name.to_string())
        }
        other => other,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use spire_git::MemoryRepo;

    fn linear_repo() -> (MemoryRepo, Oid, Oid, Oid) {
        let repo = MemoryRepo::new();
        let base = repo.commit(&[], &[("README.md", Some("hi"))], "init");
        let a = repo.commit(&[base], &[("a", Some("1"))], "a");
        let b = repo.commit(&[a], &[("b", Some("1"))], "b");
        repo.set_branch("main", base);
        repo.set_branch("feature", b);
        (repo, base, a, b)
    }

    #[test]
    fn test_ancestor_count() {
        let (repo, base, a, b) = linear_repo();
        let inspector = HistoryInspector::new(&repo);

        assert_eq!(inspector.ancestor_count(base, b).unwrap(), 2);
        assert_eq!(inspector.ancestor_count(a, a).unwrap(), 0);
        assert!(matches!(
            inspector.ancestor_count(b, base),
            Err(Error::NotAncestor { .. })
        ));
    }

    #[test]
    fn test_tip_of_unknown_branch() {
        let (repo, ..) = linear_repo();
        let inspector = HistoryInspector::new(&repo);

        let err = inspector.tip_of("nope").unwrap_err();
        assert!(matches!(err, Error::UnknownBranch(name) if name == "nope"));
    }

    #[test]
    fn test_transient_failures_are_retried() {
        let (repo, _, _, b) = linear_repo();
        let inspector = HistoryInspector::new(&repo);

        repo.fail_reads_transiently(2);
        assert_eq!(inspector.tip_of("feature").unwrap(), b);
    }

    #[test]
    fn test_retries_are_bounded() {
        let (repo, ..) = linear_repo();
        let inspector = HistoryInspector::new(&repo).with_retries(2);

        repo.fail_reads_transiently(2);
        let err = inspector.tip_of("feature").unwrap_err();
        assert!(matches!(err, Error::Git(e) if e.is_transient()));
    }
}
