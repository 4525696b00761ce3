//! Remote operations: tracking refs, live remote tips and lease-checked pushes.

use std::cell::{Cell, RefCell};

use git2::{Cred, CredentialType, Direction, ErrorCode, Oid, PushOptions, RemoteCallbacks};

use crate::Repository;
use crate::error::{Error, Result};

impl Repository {
    /// Get the URL of a remote.
    ///
    /// # Errors
    /// Returns error if the remote doesn't exist or has no URL.
    pub fn remote_url(&self, remote: &str) -> Result<String> {
        let found = self
            .inner
            .find_remote(remote)
            .map_err(|_| Error::RemoteNotFound(remote.into()))?;

        found
            .url()
            .map(String::from)
            .ok_or_else(|| Error::RemoteNotFound(remote.into()))
    }

    /// Last observed tip of a remote branch (its remote-tracking ref).
    ///
    /// # Errors
    /// Returns error if the ref exists but cannot be read.
    pub fn tracking_commit(&self, remote: &str, branch: &str) -> Result<Option<Oid>> {
        match self
            .inner
            .refname_to_id(&format!("refs/remotes/{remote}/{branch}"))
        {
            Ok(oid) => Ok(Some(oid)),
            Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Ask the remote where a branch currently points.
    ///
    /// This connects to the remote every time; nothing is cached.
    ///
    /// # Errors
    /// Returns `FetchFailed` if the remote cannot be reached.
    pub fn fetch_remote_tip(&self, remote: &str, branch: &str) -> Result<Option<Oid>> {
        let mut found = self
            .inner
            .find_remote(remote)
            .map_err(|_| Error::RemoteNotFound(remote.into()))?;

        let connection = found
            .connect_auth(Direction::Fetch, Some(self.remote_callbacks()), None)
            .map_err(|e| Error::FetchFailed(e.message().to_string()))?;

        let refname = format!("refs/heads/{branch}");
        let tip = connection
            .list()?
            .iter()
            .find(|head| head.name() == refname)
            .map(git2::RemoteHead::oid);

        Ok(tip)
    }

    /// Push a local branch, provided the remote still points at `expected`.
    ///
    /// `expected = None` means the branch must not exist on the remote yet.
    /// The lease is checked against the tip the remote advertises on the
    /// push connection itself, so nothing can land between check and push.
    /// On success the remote-tracking ref is advanced to the pushed commit.
    ///
    /// # Errors
    /// Returns `StaleRemote` if the remote moved, `PushRejected` if the
    /// remote refused the update, or `PushFailed` on transport errors.
    pub fn push_with_lease(
        &self,
        remote: &str,
        branch: &str,
        expected: Option<Oid>,
    ) -> Result<Oid> {
        let local = self.branch_commit(branch)?;

        let mut found = self
            .inner
            .find_remote(remote)
            .map_err(|_| Error::RemoteNotFound(remote.into()))?;

        let refname = format!("refs/heads/{branch}");
        // Set to the advertised tip when it doesn't match the lease
        let stale: Cell<Option<Option<Oid>>> = Cell::new(None);
        let rejection: RefCell<Option<String>> = RefCell::new(None);
        let pushed = {
            let mut callbacks = self.remote_callbacks();
            callbacks.push_negotiation(|updates| {
                let actual = updates
                    .iter()
                    .find(|update| update.dst_refname() == Some(refname.as_str()))
                    .map(|update| update.src())
                    .filter(|oid| !oid.is_zero());
                if actual == expected {
                    return Ok(());
                }
                stale.set(Some(actual));
                Err(git2::Error::from_str("remote branch moved since it was observed"))
            });
            callbacks.push_update_reference(|refname, status| {
                if let Some(message) = status {
                    *rejection.borrow_mut() = Some(format!("{refname}: {message}"));
                }
                Ok(())
            });

            let mut options = PushOptions::new();
            options.remote_callbacks(callbacks);

            let refspec = format!("+{refname}:{refname}");
            found.push(&[refspec], Some(&mut options))
        };

        if let Some(actual) = stale.get() {
            return Err(Error::StaleRemote {
                branch: branch.into(),
                expected,
                actual,
            });
        }
        pushed.map_err(|e| Error::PushFailed(e.message().to_string()))?;

        if let Some(message) = rejection.into_inner() {
            return Err(Error::PushRejected {
                branch: branch.into(),
                message,
            });
        }

        self.inner.reference(
            &format!("refs/remotes/{remote}/{branch}"),
            local,
            true,
            "spire: push",
        )?;
        tracing::debug!(remote, branch, %local, "pushed branch");

        Ok(local)
    }

    /// Parse a GitHub remote URL into `(owner, repo)`.
    ///
    /// Accepts `git@github.com:owner/repo.git`, `ssh://git@github.com/owner/repo`
    /// and `https://github.com/owner/repo(.git)`.
    ///
    /// # Errors
    /// Returns `InvalidRemoteUrl` for anything else.
    pub fn parse_github_remote(url: &str) -> Result<(String, String)> {
        let path = url
            .strip_prefix("git@github.com:")
            .or_else(|| url.strip_prefix("ssh://git@github.com/"))
            .or_else(|| url.strip_prefix("https://github.com/"))
            .or_else(|| url.strip_prefix("http://github.com/"))
            .ok_or_else(|| Error::InvalidRemoteUrl(url.into()))?;

        let path = path.trim_end_matches('/');
        let path = path.strip_suffix(".git").unwrap_or(path);

        match path.split('/').collect::<Vec<_>>().as_slice() {
            [owner, repo] if !owner.is_empty() && !repo.is_empty() => {
                Ok(((*owner).to_string(), (*repo).to_string()))
            }
            _ => Err(Error::InvalidRemoteUrl(url.into())),
        }
    }

    /// Credential callbacks: ssh-agent for SSH, credential helpers for HTTPS.
    fn remote_callbacks<'a>(&self) -> RemoteCallbacks<'a> {
        let config = self.inner.config().ok();
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(move |url, username, allowed| {
            if allowed.contains(CredentialType::SSH_KEY) {
                if let Some(user) = username {
                    return Cred::ssh_key_from_agent(user);
                }
            }
            if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
                if let Some(config) = &config {
                    return Cred::credential_helper(config, url, username);
                }
            }
            if allowed.contains(CredentialType::DEFAULT) {
                return Cred::default();
            }
            Err(git2::Error::from_str("no usable credentials for remote"))
        });
        callbacks
    }
}
