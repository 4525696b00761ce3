//! Trait abstractions for git operations.
//!
//! This module defines the `GitOps` and `RemoteOps` traits which abstract the
//! version-control store the sync engine works against, enabling dependency
//! injection and testability.

use std::path::Path;

use git2::Oid;

use crate::{Replay, Repository, Result};

/// Trait for local repository operations.
///
/// This trait abstracts git operations, allowing for:
/// - Dependency injection in the sync engine and CLI services
/// - The in-memory `MemoryRepo` used by tests (feature `test-util`)
/// - Alternative implementations (e.g., dry-run mode)
///
/// Git operations are synchronous since git2 is a synchronous library.
#[allow(clippy::missing_errors_doc)]
pub trait GitOps {
    // === Repository Info ===

    /// Get the working directory path.
    fn workdir(&self) -> Option<&Path>;

    /// Get the current branch name.
    ///
    /// Returns an error if HEAD is detached or not on a branch.
    fn current_branch(&self) -> Result<String>;

    // === Branch Operations ===

    /// List all local branches.
    fn list_branches(&self) -> Result<Vec<String>>;

    /// Get the commit ID for a branch.
    fn branch_commit(&self, branch: &str) -> Result<Oid>;

    /// Resolve a branch name or commit-ish to a commit ID.
    fn resolve_revision(&self, rev: &str) -> Result<Oid>;

    /// Move a branch to `target`, provided it still points at `expected`.
    ///
    /// If the branch is checked out, the working tree follows it.
    fn move_branch(&self, branch: &str, target: Oid, expected: Oid) -> Result<()>;

    // === Ancestry ===

    /// Check if `ancestor` is reachable from `descendant` (reflexive).
    fn is_ancestor(&self, ancestor: Oid, descendant: Oid) -> Result<bool>;

    /// Count commits reachable from `to` but not from `from`.
    fn count_commits_between(&self, from: Oid, to: Oid) -> Result<usize>;

    /// Commits reachable from `to` but not from `from`, oldest first.
    fn commits_between(&self, from: Oid, to: Oid) -> Result<Vec<Oid>>;

    /// Parent IDs of a commit, first parent first.
    fn commit_parents(&self, commit: Oid) -> Result<Vec<Oid>>;

    /// Check whether a commit is present in the object store.
    fn commit_exists(&self, commit: Oid) -> bool;

    /// Best common ancestor of two commits, if they share history.
    fn merge_base(&self, a: Oid, b: Oid) -> Result<Option<Oid>>;

    // === Rewriting ===

    /// Replay one commit's change onto a new parent.
    ///
    /// The new commit is written to the object store but not referenced.
    fn replay_commit(&self, commit: Oid, onto: Oid) -> Result<Replay>;
}

/// Trait for remote operations used by the synchronizer.
#[allow(clippy::missing_errors_doc)]
pub trait RemoteOps: GitOps {
    /// Last observed remote tip (the remote-tracking ref), if any.
    fn tracking_commit(&self, remote: &str, branch: &str) -> Result<Option<Oid>>;

    /// Current remote tip, queried from the remote itself.
    fn fetch_remote_tip(&self, remote: &str, branch: &str) -> Result<Option<Oid>>;

    /// Push the local branch, provided the remote still points at `expected`.
    ///
    /// Returns the pushed commit and advances the remote-tracking ref.
    fn push_with_lease(&self, remote: &str, branch: &str, expected: Option<Oid>) -> Result<Oid>;
}

impl GitOps for Repository {
    fn workdir(&self) -> Option<&Path> {
        Self::workdir(self)
    }

    fn current_branch(&self) -> Result<String> {
        Self::current_branch(self)
    }

    fn list_branches(&self) -> Result<Vec<String>> {
        Self::list_branches(self)
    }

    fn branch_commit(&self, branch: &str) -> Result<Oid> {
        Self::branch_commit(self, branch)
    }

    fn resolve_revision(&self, rev: &str) -> Result<Oid> {
        Self::resolve_revision(self, rev)
    }

    fn move_branch(&self, branch: &str, target: Oid, expected: Oid) -> Result<()> {
        Self::move_branch(self, branch, target, expected)
    }

    fn is_ancestor(&self, ancestor: Oid, descendant: Oid) -> Result<bool> {
        Self::is_ancestor(self, ancestor, descendant)
    }

    fn count_commits_between(&self, from: Oid, to: Oid) -> Result<usize> {
        Self::count_commits_between(self, from, to)
    }

    fn commits_between(&self, from: Oid, to: Oid) -> Result<Vec<Oid>> {
        Self::commits_between(self, from, to)
    }

    fn commit_parents(&self, commit: Oid) -> Result<Vec<Oid>> {
        Self::commit_parents(self, commit)
    }

    fn commit_exists(&self, commit: Oid) -> bool {
        Self::commit_exists(self, commit)
    }

    fn merge_base(&self, a: Oid, b: Oid) -> Result<Option<Oid>> {
        Self::merge_base(self, a, b)
    }

    fn replay_commit(&self, commit: Oid, onto: Oid) -> Result<Replay> {
        Self::replay_commit(self, commit, onto)
    }
}

impl RemoteOps for Repository {
    fn tracking_commit(&self, remote: &str, branch: &str) -> Result<Option<Oid>> {
        Self::tracking_commit(self, remote, branch)
    }

    fn fetch_remote_tip(&self, remote: &str, branch: &str) -> Result<Option<Oid>> {
        Self::fetch_remote_tip(self, remote, branch)
    }

    fn push_with_lease(&self, remote: &str, branch: &str, expected: Option<Oid>) -> Result<Oid> {
        Self::push_with_lease(self, remote, branch, expected)
    }
}
