//! Sync service: runs the orchestrator and keeps the checkpoint on disk in
//! step with it.

use anyhow::{Result, bail};
use spire_core::{
    AbortReport, CancelToken, LockTable, Orchestrator, Phase, StateStore, SyncCheckpoint,
    SyncOptions, SyncReport, SyncRequest,
};
use spire_git::RemoteOps;

/// Service for sync-stack with trait-based dependencies.
pub struct SyncStackService<'a, R: RemoteOps, S: StateStore> {
    repo: &'a R,
    state: &'a S,
    locks: LockTable,
    options: SyncOptions,
    cancel: CancelToken,
    read_retries: u32,
}

impl<'a, R: RemoteOps, S: StateStore> SyncStackService<'a, R, S> {
    pub fn new(repo: &'a R, state: &'a S, options: SyncOptions, cancel: CancelToken) -> Self {
        Self {
            repo,
            state,
            locks: state.lock_table(),
            options,
            cancel,
            read_retries: spire_core::inspector::DEFAULT_READ_RETRIES,
        }
    }

    #[must_use]
    pub const fn with_read_retries(mut self, attempts: u32) -> Self {
        self.read_retries = attempts;
        self
    }

    fn orchestrator(&self) -> Orchestrator<'_, R> {
        Orchestrator::new(self.repo, &self.locks, self.options.clone())
            .with_cancel(self.cancel.clone())
            .with_read_retries(self.read_retries)
    }

    /// Start a new run.
    ///
    /// # Errors
    /// Fails if a run is already parked, or if the checkpoint can't be saved.
    pub fn run(&self, request: &SyncRequest) -> Result<SyncReport> {
        if self.state.is_sync_in_progress() {
            bail!(spire_core::Error::SyncInProgress);
        }

        let report = self.orchestrator().run(request);
        self.persist(&report, None)?;
        Ok(report)
    }

    /// Continue the parked run.
    ///
    /// # Errors
    /// Fails if nothing is parked or the checkpoint can't be read or written.
    pub fn resume(&self) -> Result<SyncReport> {
        let checkpoint = self.state.load_checkpoint()?;
        let report = self.orchestrator().resume(&checkpoint);
        self.persist(&report, Some(&checkpoint))?;
        Ok(report)
    }

    /// Abandon the parked run, restoring the branches it moved.
    ///
    /// # Errors
    /// Fails if nothing is parked.
    pub fn abort(&self) -> Result<AbortReport> {
        let checkpoint = self.state.load_checkpoint()?;
        let report = self.orchestrator().abort(&checkpoint)?;
        self.state.clear_checkpoint()?;
        Ok(report)
    }

    /// Save a parked run; forget the checkpoint once the rewrite is complete.
    ///
    /// A resumed run that fails while moving branches keeps its checkpoint,
    /// updated with every move confirmed so far, so that abort can still
    /// restore all of them.
    fn persist(&self, report: &SyncReport, resumed: Option<&SyncCheckpoint>) -> Result<()> {
        if let Some(checkpoint) = report.checkpoint() {
            self.state.save_checkpoint(checkpoint)?;
        } else if report.is_success() || report.stage() == Phase::Synchronizing {
            self.state.clear_checkpoint()?;
        } else if let (Some(resumed), Phase::Executing) = (resumed, report.stage()) {
            let checkpoint = SyncCheckpoint {
                moved: report.moved.clone(),
                ..resumed.clone()
            };
            self.state.save_checkpoint(&checkpoint)?;
        }
        Ok(())
    }
}
