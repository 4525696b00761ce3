//! Scoped locks over sets of branch names, shared by every spire process
//! working on the repository.
//!
//! Each key is an OS-level exclusive lock (`fs2`) on its own file under
//! `<dir>/local/` or `<dir>/remote/`. Local rewrites and remote pushes use
//! separate key spaces: a sync run holds the local keys for its whole chain
//! and still takes per-branch remote keys while pushing.
//!
//! Lock files are never removed; only the OS lock on them matters.

use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::Result;

/// A lockable name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockKey {
    /// A local branch reference being rewritten.
    Local(String),
    /// A remote branch being pushed.
    Remote(String),
}

impl LockKey {
    /// Local keys for every branch in `names`.
    pub fn local<I, S>(names: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names.into_iter().map(|n| Self::Local(n.into())).collect()
    }

    fn path_in(&self, dir: &Path) -> PathBuf {
        let (space, branch) = match self {
            Self::Local(branch) => ("local", branch),
            Self::Remote(branch) => ("remote", branch),
        };
        // `feature` and `feature/x` must not collide as file and directory
        let file = branch.replace('%', "%25").replace('/', "%2F");
        dir.join(space).join(file)
    }
}

/// Lock files rooted at one directory, normally `.git/spire/locks`.
#[derive(Debug, Clone)]
pub struct LockTable {
    dir: PathBuf,
}

impl LockTable {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Block until all `keys` are free, then hold them until the guard drops.
    ///
    /// Keys are taken in sorted order, so overlapping requests cannot
    /// deadlock.
    ///
    /// # Errors
    /// Returns an I/O error if a lock file can't be created or locked.
    pub fn acquire(&self, keys: impl IntoIterator<Item = LockKey>) -> Result<LockGuard> {
        let keys: BTreeSet<LockKey> = keys.into_iter().collect();
        if let Some(guard) = self.try_acquire(keys.iter().cloned())? {
            return Ok(guard);
        }

        tracing::info!(?keys, "waiting for branch locks held elsewhere");
        let mut guard = LockGuard::default();
        for key in keys {
            let file = self.open(&key)?;
            file.lock_exclusive()?;
            guard.held.push((key, file));
        }
        Ok(guard)
    }

    /// Take all `keys` if none is held elsewhere, without blocking.
    ///
    /// # Errors
    /// Returns an I/O error if a lock file can't be created or locked.
    pub fn try_acquire(
        &self,
        keys: impl IntoIterator<Item = LockKey>,
    ) -> Result<Option<LockGuard>> {
        let mut guard = LockGuard::default();
        for key in keys.into_iter().collect::<BTreeSet<_>>() {
            let file = self.open(&key)?;
            match file.try_lock_exclusive() {
                Ok(()) => guard.held.push((key, file)),
                Err(err) if is_contended(&err) => return Ok(None),
                Err(err) => return Err(err.into()),
            }
        }
        Ok(Some(guard))
    }

    fn open(&self, key: &LockKey) -> io::Result<File> {
        let path = key.path_in(&self.dir);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.raw_os_error().is_some()
        && err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Releases its keys on drop, including during unwinding.
#[derive(Debug, Default)]
pub struct LockGuard {
    held: Vec<(LockKey, File)>,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        for (key, file) in self.held.drain(..) {
            // Closing the file releases the lock as well
            if let Err(err) = FileExt::unlock(&file) {
                tracing::debug!(?key, %err, "unlock failed");
            }
        }
    }
}

/// A table in a fresh temporary directory.
#[cfg(test)]
pub(crate) fn scratch() -> (tempfile::TempDir, LockTable) {
    let dir = tempfile::TempDir::new().unwrap_or_else(|err| panic!("temp dir: {err}"));
    let table = LockTable::new(dir.path());
    (dir, table)
}
