//! In-memory repository for exercising the sync engine without a disk.
//!
//! Commits are flat file maps. Replay is a per-file three-way merge, which is
//! enough to model clean replays, absorbed changes and conflicts. Faults can
//! be injected per branch (failing moves, rejected pushes) or globally
//! (transient read failures).

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use git2::{ErrorClass, ErrorCode, ObjectType, Oid};

use crate::error::{Error, Result};
use crate::traits::{GitOps, RemoteOps};
use crate::Replay;

#[derive(Debug, Clone)]
struct MemCommit {
    parents: Vec<Oid>,
    files: BTreeMap<String, String>,
    message: String,
}

#[derive(Debug, Default)]
struct State {
    commits: HashMap<Oid, MemCommit>,
    branches: BTreeMap<String, Oid>,
    current: Option<String>,
    remotes: HashMap<String, BTreeMap<String, Oid>>,
    tracking: HashMap<(String, String), Oid>,
    failing_moves: HashSet<String>,
    rejected_pushes: HashSet<String>,
    transient_failures: usize,
    sequence: u64,
}

/// A repository that lives entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryRepo {
    state: RefCell<State>,
}

impl MemoryRepo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // === Builders ===

    /// Create a commit on top of `parents`.
    ///
    /// Files start from the first parent's snapshot; each change sets a file
    /// (`Some(content)`) or deletes it (`None`).
    pub fn commit(&self, parents: &[Oid], changes: &[(&str, Option<&str>)], message: &str) -> Oid {
        let mut files = parents
            .first()
            .and_then(|p| self.state.borrow().commits.get(p).map(|c| c.files.clone()))
            .unwrap_or_default();

        for (path, content) in changes {
            match content {
                Some(content) => files.insert((*path).to_string(), (*content).to_string()),
                None => files.remove(*path),
            };
        }

        self.insert_commit(MemCommit {
            parents: parents.to_vec(),
            files,
            message: message.to_string(),
        })
    }

    /// Point a branch at a commit, creating it if needed.
    pub fn set_branch(&self, branch: &str, commit: Oid) {
        self.state
            .borrow_mut()
            .branches
            .insert(branch.to_string(), commit);
    }

    /// Current tip of a branch, if it exists.
    #[must_use]
    pub fn branch(&self, branch: &str) -> Option<Oid> {
        self.state.borrow().branches.get(branch).copied()
    }

    /// Mark a branch as checked out.
    pub fn set_current_branch(&self, branch: &str) {
        self.state.borrow_mut().current = Some(branch.to_string());
    }

    /// Register a remote with no branches.
    pub fn add_remote(&self, remote: &str) {
        self.state
            .borrow_mut()
            .remotes
            .entry(remote.to_string())
            .or_default();
    }

    /// Set a branch on the remote side, as if someone else pushed it.
    pub fn set_remote_branch(&self, remote: &str, branch: &str, commit: Oid) {
        self.state
            .borrow_mut()
            .remotes
            .entry(remote.to_string())
            .or_default()
            .insert(branch.to_string(), commit);
    }

    /// Where the remote side currently has a branch.
    #[must_use]
    pub fn remote_branch(&self, remote: &str, branch: &str) -> Option<Oid> {
        self.state
            .borrow()
            .remotes
            .get(remote)
            .and_then(|branches| branches.get(branch).copied())
    }

    /// Set the remote-tracking ref (the last observed remote tip).
    pub fn set_tracking(&self, remote: &str, branch: &str, commit: Oid) {
        self.state
            .borrow_mut()
            .tracking
            .insert((remote.to_string(), branch.to_string()), commit);
    }

    /// Make every future move of `branch` fail.
    pub fn fail_move(&self, branch: &str) {
        self.state
            .borrow_mut()
            .failing_moves
            .insert(branch.to_string());
    }

    /// Let moves of `branch` succeed again.
    pub fn heal_move(&self, branch: &str) {
        self.state.borrow_mut().failing_moves.remove(branch);
    }

    /// Make the remote refuse every push of `branch`.
    pub fn reject_push(&self, branch: &str) {
        self.state
            .borrow_mut()
            .rejected_pushes
            .insert(branch.to_string());
    }

    /// Fail the next `count` read queries with a lock-contention error.
    pub fn fail_reads_transiently(&self, count: usize) {
        self.state.borrow_mut().transient_failures = count;
    }

    // === Inspection ===

    /// Snapshot of a commit's files.
    #[must_use]
    pub fn files(&self, commit: Oid) -> BTreeMap<String, String> {
        self.state
            .borrow()
            .commits
            .get(&commit)
            .map(|c| c.files.clone())
            .unwrap_or_default()
    }

    /// Message of a commit.
    #[must_use]
    pub fn message(&self, commit: Oid) -> Option<String> {
        self.state
            .borrow()
            .commits
            .get(&commit)
            .map(|c| c.message.clone())
    }

    // === Internals ===

    #[allow(clippy::expect_used)]
    fn insert_commit(&self, commit: MemCommit) -> Oid {
        let mut state = self.state.borrow_mut();
        state.sequence += 1;

        let mut content = format!("seq {}\n", state.sequence);
        for parent in &commit.parents {
            content.push_str(&format!("parent {parent}\n"));
        }
        for (path, data) in &commit.files {
            content.push_str(&format!("file {path} {data}\n"));
        }
        content.push_str(&commit.message);

        // Hashing an in-memory blob has no failure mode
        let id = Oid::hash_object(ObjectType::Blob, content.as_bytes())
            .expect("hashing in-memory content");
        state.commits.insert(id, commit);
        id
    }

    /// Consume one injected transient failure, if any are pending.
    fn check_read(&self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(Error::Git2(git2::Error::new(
                ErrorCode::Locked,
                ErrorClass::Os,
                "resource temporarily locked",
            )));
        }
        Ok(())
    }

    fn find(&self, commit: Oid) -> Result<MemCommit> {
        self.state
            .borrow()
            .commits
            .get(&commit)
            .cloned()
            .ok_or(Error::CommitNotFound(commit))
    }

    /// Every commit reachable from `tip`, including `tip`.
    fn reachable(&self, tip: Oid) -> Result<HashSet<Oid>> {
        let mut seen = HashSet::new();
        let mut pending = vec![tip];
        while let Some(oid) = pending.pop() {
            if seen.insert(oid) {
                pending.extend(self.find(oid)?.parents);
            }
        }
        Ok(seen)
    }
}

impl GitOps for MemoryRepo {
    fn workdir(&self) -> Option<&Path> {
        None
    }

    fn current_branch(&self) -> Result<String> {
        self.state
            .borrow()
            .current
            .clone()
            .ok_or(Error::DetachedHead)
    }

    fn list_branches(&self) -> Result<Vec<String>> {
        self.check_read()?;
        Ok(self.state.borrow().branches.keys().cloned().collect())
    }

    fn branch_commit(&self, branch: &str) -> Result<Oid> {
        self.check_read()?;
        self.branch(branch)
            .ok_or_else(|| Error::BranchNotFound(branch.into()))
    }

    fn resolve_revision(&self, rev: &str) -> Result<Oid> {
        if let Some(oid) = self.branch(rev) {
            return Ok(oid);
        }
        Oid::from_str(rev)
            .ok()
            .filter(|oid| self.commit_exists(*oid))
            .ok_or_else(|| Error::RevisionNotFound(rev.into()))
    }

    fn move_branch(&self, branch: &str, target: Oid, expected: Oid) -> Result<()> {
        if !self.commit_exists(target) {
            return Err(Error::CommitNotFound(target));
        }

        let mut state = self.state.borrow_mut();
        if state.failing_moves.contains(branch) {
            return Err(Error::RefUpdateFailed {
                branch: branch.into(),
                message: "injected failure".into(),
            });
        }

        let actual = state.branches.get(branch).copied();
        if actual != Some(expected) {
            return Err(Error::RefMoved {
                branch: branch.into(),
                expected,
                actual,
            });
        }

        state.branches.insert(branch.to_string(), target);
        Ok(())
    }

    fn is_ancestor(&self, ancestor: Oid, descendant: Oid) -> Result<bool> {
        self.check_read()?;
        Ok(self.reachable(descendant)?.contains(&ancestor))
    }

    fn count_commits_between(&self, from: Oid, to: Oid) -> Result<usize> {
        Ok(self.commits_between(from, to)?.len())
    }

    fn commits_between(&self, from: Oid, to: Oid) -> Result<Vec<Oid>> {
        self.check_read()?;
        let hidden = self.reachable(from)?;

        // Post-order walk: parents are emitted before their children
        let mut ordered = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![(to, false)];
        while let Some((oid, expanded)) = stack.pop() {
            if hidden.contains(&oid) {
                continue;
            }
            if expanded {
                ordered.push(oid);
                continue;
            }
            if !visited.insert(oid) {
                continue;
            }
            stack.push((oid, true));
            for parent in self.find(oid)?.parents.into_iter().rev() {
                if !visited.contains(&parent) {
                    stack.push((parent, false));
                }
            }
        }

        Ok(ordered)
    }

    fn commit_parents(&self, commit: Oid) -> Result<Vec<Oid>> {
        self.check_read()?;
        Ok(self.find(commit)?.parents)
    }

    fn commit_exists(&self, commit: Oid) -> bool {
        self.state.borrow().commits.contains_key(&commit)
    }

    fn merge_base(&self, a: Oid, b: Oid) -> Result<Option<Oid>> {
        self.check_read()?;
        let from_a = self.reachable(a)?;
        let common: Vec<Oid> = self
            .reachable(b)?
            .into_iter()
            .filter(|oid| from_a.contains(oid))
            .collect();

        // The best candidate reaches every other common ancestor
        for candidate in &common {
            let below = self.reachable(*candidate)?;
            if common.iter().all(|other| below.contains(other)) {
                return Ok(Some(*candidate));
            }
        }
        Ok(common.first().copied())
    }

    fn replay_commit(&self, commit: Oid, onto: Oid) -> Result<Replay> {
        let source = self.find(commit)?;
        let target = self.find(onto)?;
        let base = match source.parents.first() {
            Some(parent) => self.find(*parent)?.files,
            None => BTreeMap::new(),
        };

        let paths: std::collections::BTreeSet<&String> = base
            .keys()
            .chain(target.files.keys())
            .chain(source.files.keys())
            .collect();

        let mut merged = BTreeMap::new();
        let mut conflicts = Vec::new();
        for path in paths {
            let ancestor = base.get(path);
            let ours = target.files.get(path);
            let theirs = source.files.get(path);

            let resolved = if theirs == ancestor || ours == theirs {
                ours
            } else if ours == ancestor {
                theirs
            } else {
                conflicts.push(path.clone());
                continue;
            };

            if let Some(content) = resolved {
                merged.insert(path.clone(), content.clone());
            }
        }

        if !conflicts.is_empty() {
            return Ok(Replay::Conflict(conflicts));
        }
        if merged == target.files {
            return Ok(Replay::Empty);
        }

        Ok(Replay::Applied(self.insert_commit(MemCommit {
            parents: vec![onto],
            files: merged,
            message: source.message,
        })))
    }
}

impl RemoteOps for MemoryRepo {
    fn tracking_commit(&self, remote: &str, branch: &str) -> Result<Option<Oid>> {
        self.check_read()?;
        Ok(self
            .state
            .borrow()
            .tracking
            .get(&(remote.to_string(), branch.to_string()))
            .copied())
    }

    fn fetch_remote_tip(&self, remote: &str, branch: &str) -> Result<Option<Oid>> {
        if !self.state.borrow().remotes.contains_key(remote) {
            return Err(Error::RemoteNotFound(remote.into()));
        }
        self.check_read()
            .map_err(|e| Error::FetchFailed(e.to_string()))?;
        Ok(self.remote_branch(remote, branch))
    }

    fn push_with_lease(&self, remote: &str, branch: &str, expected: Option<Oid>) -> Result<Oid> {
        let local = self.branch_commit(branch)?;

        let actual = self.fetch_remote_tip(remote, branch)?;
        if actual != expected {
            return Err(Error::StaleRemote {
                branch: branch.into(),
                expected,
                actual,
            });
        }

        if self.state.borrow().rejected_pushes.contains(branch) {
            return Err(Error::PushRejected {
                branch: branch.into(),
                message: "pre-receive hook declined".into(),
            });
        }

        self.set_remote_branch(remote, branch, local);
        self.set_tracking(remote, branch, local);
        Ok(local)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_commits_between_is_oldest_first() {
        let repo = MemoryRepo::new();
        let base = repo.commit(&[], &[("README.md", Some("hi"))], "init");
        let a = repo.commit(&[base], &[("a", Some("1"))], "a");
        let b = repo.commit(&[a], &[("b", Some("1"))], "b");

        assert_eq!(repo.commits_between(base, b).unwrap(), vec![a, b]);
        assert!(repo.is_ancestor(base, b).unwrap());
        assert!(!repo.is_ancestor(b, a).unwrap());
    }

    #[test]
    fn test_replay_outcomes() {
        let repo = MemoryRepo::new();
        let base = repo.commit(&[], &[("f", Some("0"))], "init");
        let change = repo.commit(&[base], &[("f", Some("1"))], "edit f");

        let clean = repo.commit(&[base], &[("g", Some("x"))], "other");
        let Replay::Applied(new) = repo.replay_commit(change, clean).unwrap() else {
            panic!("expected clean replay");
        };
        assert_eq!(repo.files(new).get("f").map(String::as_str), Some("1"));
        assert_eq!(repo.files(new).get("g").map(String::as_str), Some("x"));
        assert_eq!(repo.commit_parents(new).unwrap(), vec![clean]);

        let absorbed = repo.commit(&[base], &[("f", Some("1"))], "squash");
        assert_eq!(repo.replay_commit(change, absorbed).unwrap(), Replay::Empty);

        let clash = repo.commit(&[base], &[("f", Some("2"))], "clash");
        assert_eq!(
            repo.replay_commit(change, clash).unwrap(),
            Replay::Conflict(vec!["f".to_string()])
        );
    }

    #[test]
    fn test_transient_failures_are_consumed() {
        let repo = MemoryRepo::new();
        let base = repo.commit(&[], &[], "init");
        repo.set_branch("main", base);
        repo.fail_reads_transiently(1);

        let err = repo.branch_commit("main").unwrap_err();
        assert!(err.is_transient());
        assert_eq!(repo.branch_commit("main").unwrap(), base);
    }

    #[test]
    fn test_push_with_lease_checks_remote() {
        let repo = MemoryRepo::new();
        let base = repo.commit(&[], &[], "init");
        let next = repo.commit(&[base], &[("a", Some("1"))], "a");
        repo.set_branch("feature", next);
        repo.set_remote_branch("origin", "feature", base);

        let err = repo.push_with_lease("origin", "feature", None).unwrap_err();
        assert!(matches!(err, Error::StaleRemote { .. }));

        assert_eq!(repo.push_with_lease("origin", "feature", Some(base)).unwrap(), next);
        assert_eq!(repo.remote_branch("origin", "feature"), Some(next));
        assert_eq!(repo.tracking_commit("origin", "feature").unwrap(), Some(next));
    }
}
