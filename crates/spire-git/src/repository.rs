//! Repository wrapper providing high-level git operations.

use std::path::Path;

use git2::{BranchType, ErrorCode, Oid, RepositoryState, Sort};

use crate::error::{Error, Result};

/// High-level wrapper around a git repository.
pub struct Repository {
    pub(crate) inner: git2::Repository,
}

impl Repository {
    /// Open a repository at the given path.
    ///
    /// # Errors
    /// Returns error if no repository found at path or any parent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let inner = git2::Repository::discover(path).map_err(|err| match err.code() {
            ErrorCode::NotFound => Error::NotARepository,
            _ => Error::Git2(err),
        })?;
        Ok(Self { inner })
    }

    /// Open the repository containing the current directory.
    ///
    /// # Errors
    /// Returns error if not inside a git repository.
    pub fn open_current() -> Result<Self> {
        Self::open(".")
    }

    /// Get the path to the repository root (workdir).
    #[must_use]
    pub fn workdir(&self) -> Option<&Path> {
        self.inner.workdir()
    }

    /// Get the path to the .git directory.
    #[must_use]
    pub fn git_dir(&self) -> &Path {
        self.inner.path()
    }

    /// Check if a rebase, merge or cherry-pick is in progress.
    #[must_use]
    pub fn is_operation_in_progress(&self) -> bool {
        self.inner.state() != RepositoryState::Clean
    }

    // === Branch operations ===

    /// Get the name of the current branch.
    ///
    /// # Errors
    /// Returns error if HEAD is detached.
    pub fn current_branch(&self) -> Result<String> {
        let head = self.inner.head()?;
        if !head.is_branch() {
            return Err(Error::DetachedHead);
        }

        head.shorthand()
            .map(String::from)
            .ok_or(Error::DetachedHead)
    }

    /// Get the commit SHA for a branch.
    ///
    /// # Errors
    /// Returns error if branch doesn't exist.
    pub fn branch_commit(&self, branch_name: &str) -> Result<Oid> {
        let branch = self
            .inner
            .find_branch(branch_name, BranchType::Local)
            .map_err(|_| Error::BranchNotFound(branch_name.into()))?;

        branch
            .get()
            .target()
            .ok_or_else(|| Error::BranchNotFound(branch_name.into()))
    }

    /// Resolve a branch name or any commit-ish (`origin/main`, a SHA) to a commit.
    ///
    /// Local branch names take precedence over other interpretations.
    ///
    /// # Errors
    /// Returns `RevisionNotFound` if nothing matches.
    pub fn resolve_revision(&self, rev: &str) -> Result<Oid> {
        if let Ok(oid) = self.branch_commit(rev) {
            return Ok(oid);
        }

        self.inner
            .revparse_single(rev)
            .and_then(|object| object.peel_to_commit())
            .map(|commit| commit.id())
            .map_err(|_| Error::RevisionNotFound(rev.into()))
    }

    /// List all local branches.
    ///
    /// # Errors
    /// Returns error if branch listing fails.
    pub fn list_branches(&self) -> Result<Vec<String>> {
        let branches = self.inner.branches(Some(BranchType::Local))?;

        let names: Vec<String> = branches
            .filter_map(|b| b.ok())
            .filter_map(|(b, _)| b.name().ok().flatten().map(String::from))
            .collect();

        Ok(names)
    }

    /// Move a branch to `target` if it still points at `expected`.
    ///
    /// The update is compare-and-swap at the reference level. When the branch
    /// is checked out the working tree is reset to the new tip, so callers
    /// must ensure the tree is clean first.
    ///
    /// # Errors
    /// Returns `RefMoved` if the branch is no longer at `expected`.
    pub fn move_branch(&self, branch_name: &str, target: Oid, expected: Oid) -> Result<()> {
        let actual = self.branch_commit(branch_name).ok();
        if actual != Some(expected) {
            return Err(Error::RefMoved {
                branch: branch_name.into(),
                expected,
                actual,
            });
        }

        let commit = self.inner.find_commit(target)?;
        let reference_name = format!("refs/heads/{branch_name}");

        self.inner
            .reference_matching(
                &reference_name,
                target,
                true,
                expected,
                &format!("spire: move to {}", &target.to_string()[..8]),
            )
            .map_err(|err| match err.code() {
                ErrorCode::Modified => Error::RefMoved {
                    branch: branch_name.into(),
                    expected,
                    actual: self.branch_commit(branch_name).ok(),
                },
                _ => Error::RefUpdateFailed {
                    branch: branch_name.into(),
                    message: err.message().to_string(),
                },
            })?;

        tracing::debug!(branch = branch_name, from = %expected, to = %target, "moved branch");

        // If this is the current branch, also update working directory
        if self.current_branch().ok().as_deref() == Some(branch_name) {
            self.inner
                .reset(commit.as_object(), git2::ResetType::Hard, None)?;
        }

        Ok(())
    }

    // === Working directory state ===

    /// Check if the working directory is clean.
    ///
    /// Untracked files are ignored; only changes a reset would destroy count.
    ///
    /// # Errors
    /// Returns error if status check fails.
    pub fn is_clean(&self) -> Result<bool> {
        let mut options = git2::StatusOptions::new();
        options.include_untracked(false).include_ignored(false);
        let statuses = self.inner.statuses(Some(&mut options))?;
        Ok(statuses.is_empty())
    }

    /// Ensure no git operation is half done and the working directory is clean.
    ///
    /// # Errors
    /// Returns `OperationInProgress` during a rebase or merge, or
    /// `DirtyWorkingDirectory` if there are uncommitted changes.
    pub fn require_clean(&self) -> Result<()> {
        if self.is_operation_in_progress() {
            return Err(Error::OperationInProgress);
        }
        if self.is_clean()? {
            Ok(())
        } else {
            Err(Error::DirtyWorkingDirectory)
        }
    }

    // === Commit graph ===

    /// Check if a commit exists in the object store.
    #[must_use]
    pub fn commit_exists(&self, oid: Oid) -> bool {
        self.inner.find_commit(oid).is_ok()
    }

    /// Get the parents of a commit.
    ///
    /// # Errors
    /// Returns `CommitNotFound` if the commit is missing.
    pub fn commit_parents(&self, oid: Oid) -> Result<Vec<Oid>> {
        let commit = self
            .inner
            .find_commit(oid)
            .map_err(|_| Error::CommitNotFound(oid))?;
        Ok(commit.parent_ids().collect())
    }

    /// Check if `ancestor` is reachable from `descendant`.
    ///
    /// A commit counts as its own ancestor.
    ///
    /// # Errors
    /// Returns error if either commit is missing.
    pub fn is_ancestor(&self, ancestor: Oid, descendant: Oid) -> Result<bool> {
        if ancestor == descendant {
            return Ok(true);
        }
        Ok(self.inner.graph_descendant_of(descendant, ancestor)?)
    }

    /// Find the best common ancestor of two commits.
    ///
    /// # Errors
    /// Returns error if either commit is missing.
    pub fn merge_base(&self, a: Oid, b: Oid) -> Result<Option<Oid>> {
        match self.inner.merge_base(a, b) {
            Ok(oid) => Ok(Some(oid)),
            Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Count commits between two points.
    ///
    /// # Errors
    /// Returns error if revwalk fails.
    pub fn count_commits_between(&self, from: Oid, to: Oid) -> Result<usize> {
        let mut revwalk = self.inner.revwalk()?;
        revwalk.push(to)?;
        revwalk.hide(from)?;

        Ok(revwalk.count())
    }

    /// List commits reachable from `to` but not from `from`, oldest first.
    ///
    /// # Errors
    /// Returns error if revwalk fails.
    pub fn commits_between(&self, from: Oid, to: Oid) -> Result<Vec<Oid>> {
        let mut revwalk = self.inner.revwalk()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;
        revwalk.push(to)?;
        revwalk.hide(from)?;

        revwalk
            .map(|oid| oid.map_err(Error::from))
            .collect()
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("path", &self.git_dir())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Create a repository with a configured identity and one initial commit on `main`.
    pub(crate) fn init_test_repo() -> (TempDir, Repository) {
        let temp = TempDir::new().unwrap();
        let mut opts = git2::RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = git2::Repository::init_opts(temp.path(), &opts).unwrap();

        {
            let mut config = repo.config().unwrap();
            config.set_str("user.name", "Test User").unwrap();
            config.set_str("user.email", "test@example.com").unwrap();
        }

        let wrapped = Repository { inner: repo };
        commit_file(&wrapped, "README.md", "# test\n", "Initial commit");
        (temp, wrapped)
    }

    /// Write a file, stage it and commit on the current HEAD.
    pub(crate) fn commit_file(repo: &Repository, name: &str, content: &str, msg: &str) -> Oid {
        let workdir = repo.workdir().unwrap().to_path_buf();
        fs::write(workdir.join(name), content).unwrap();

        let mut index = repo.inner.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.inner.find_tree(tree_id).unwrap();
        let sig = repo.inner.signature().unwrap();

        let parent = repo
            .inner
            .head()
            .ok()
            .and_then(|h| h.target())
            .map(|oid| repo.inner.find_commit(oid).unwrap());
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

        repo.inner
            .commit(Some("HEAD"), &sig, &sig, msg, &tree, &parents)
            .unwrap()
    }

    /// Create a branch at HEAD and check it out.
    pub(crate) fn checkout_new_branch(repo: &Repository, name: &str) {
        let head = repo.inner.head().unwrap().peel_to_commit().unwrap();
        repo.inner.branch(name, &head, false).unwrap();
        repo.inner.set_head(&format!("refs/heads/{name}")).unwrap();
        repo.inner
            .checkout_head(Some(git2::build::CheckoutBuilder::new().force()))
            .unwrap();
    }

    #[test]
    fn test_current_branch() {
        let (_temp, repo) = init_test_repo();
        assert_eq!(repo.current_branch().unwrap(), "main");
    }

    #[test]
    fn test_is_clean() {
        let (temp, repo) = init_test_repo();

        assert!(repo.is_clean().unwrap());

        fs::write(temp.path().join("README.md"), "changed").unwrap();
        assert!(!repo.is_clean().unwrap());
        assert!(matches!(
            repo.require_clean(),
            Err(Error::DirtyWorkingDirectory)
        ));
    }

    #[test]
    fn test_unfinished_merge_is_not_clean() {
        let (_temp, repo) = init_test_repo();
        let head = repo.branch_commit("main").unwrap();
        assert!(!repo.is_operation_in_progress());

        fs::write(repo.git_dir().join("MERGE_HEAD"), format!("{head}\n")).unwrap();

        assert!(repo.is_operation_in_progress());
        assert!(matches!(
            repo.require_clean(),
            Err(Error::OperationInProgress)
        ));
    }

    #[test]
    fn test_list_branches() {
        let (_temp, repo) = init_test_repo();

        checkout_new_branch(&repo, "feature/a");
        checkout_new_branch(&repo, "feature/b");

        let branches = repo.list_branches().unwrap();
        assert_eq!(branches.len(), 3);
        assert!(branches.iter().any(|b| b == "feature/a"));
        assert!(branches.iter().any(|b| b == "feature/b"));
    }

    #[test]
    fn test_ancestry_queries() {
        let (_temp, repo) = init_test_repo();
        let base = repo.branch_commit("main").unwrap();

        checkout_new_branch(&repo, "feature");
        let first = commit_file(&repo, "a.txt", "a", "add a");
        let second = commit_file(&repo, "b.txt", "b", "add b");

        assert!(repo.is_ancestor(base, second).unwrap());
        assert!(repo.is_ancestor(second, second).unwrap());
        assert!(!repo.is_ancestor(second, base).unwrap());
        assert_eq!(repo.count_commits_between(base, second).unwrap(), 2);
        assert_eq!(repo.commits_between(base, second).unwrap(), vec![first, second]);
        assert_eq!(repo.commit_parents(second).unwrap(), vec![first]);
        assert_eq!(repo.merge_base(second, base).unwrap(), Some(base));
    }

    #[test]
    fn test_resolve_revision() {
        let (_temp, repo) = init_test_repo();
        let main = repo.branch_commit("main").unwrap();

        assert_eq!(repo.resolve_revision("main").unwrap(), main);
        assert_eq!(repo.resolve_revision(&main.to_string()).unwrap(), main);
        assert!(matches!(
            repo.resolve_revision("nope"),
            Err(Error::RevisionNotFound(_))
        ));
    }

    #[test]
    fn test_move_branch_compare_and_swap() {
        let (_temp, repo) = init_test_repo();
        let base = repo.branch_commit("main").unwrap();

        checkout_new_branch(&repo, "feature");
        let tip = commit_file(&repo, "a.txt", "a", "add a");
        checkout_new_branch(&repo, "other");

        // Wrong expectation is refused and leaves the branch alone
        let err = repo.move_branch("feature", base, base).unwrap_err();
        assert!(matches!(err, Error::RefMoved { .. }));
        assert_eq!(repo.branch_commit("feature").unwrap(), tip);

        repo.move_branch("feature", base, tip).unwrap();
        assert_eq!(repo.branch_commit("feature").unwrap(), base);
    }

    #[test]
    fn test_move_current_branch_updates_worktree() {
        let (temp, repo) = init_test_repo();
        let base = repo.branch_commit("main").unwrap();

        checkout_new_branch(&repo, "feature");
        let tip = commit_file(&repo, "a.txt", "a", "add a");
        assert!(temp.path().join("a.txt").exists());

        repo.move_branch("feature", base, tip).unwrap();
        assert!(!temp.path().join("a.txt").exists());
        assert!(repo.is_clean().unwrap());
    }
}
