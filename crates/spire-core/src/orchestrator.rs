//! Stack orchestration: resolve, plan, execute and push as one run.
//!
//! A run moves through `Idle -> Resolving -> Planning -> Executing ->
//! Synchronizing -> Done`. A conflict while planning executes the clean
//! prefix and parks the run in `AwaitingConflictResolution` with a
//! [`SyncCheckpoint`] that [`Orchestrator::resume`] or
//! [`Orchestrator::abort`] picks up later. Any failure ends the run in
//! `Failed`, recording the phase it happened in.

use std::fmt;

use chrono::Utc;
use serde::Serialize;
use spire_git::{Oid, RemoteOps};

use crate::cancel::CancelToken;
use crate::error::{Error, ReasonCode, Result};
use crate::exec;
use crate::inspector::{DEFAULT_READ_RETRIES, HistoryInspector};
use crate::lock::{LockGuard, LockKey, LockTable};
use crate::plan::{self, BranchUpdate, PlanCursor, RewritePlan};
use crate::push::{PushOutcome, PushReport, RemoteSynchronizer, RemoteTips};
use crate::resolver;
use crate::stack::{ChainBranch, DependencyChain};
use crate::state::{RemoteTip, SyncCheckpoint};

/// Times the chain is re-resolved when it grows while being locked.
const LOCK_ATTEMPTS: usize = 3;

/// States of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Resolving,
    Planning,
    AwaitingConflictResolution,
    Executing,
    Synchronizing,
    Done,
    Failed,
}

impl Phase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Resolving => "resolving",
            Self::Planning => "planning",
            Self::AwaitingConflictResolution => "awaiting_conflict_resolution",
            Self::Executing => "executing",
            Self::Synchronizing => "synchronizing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What changed, and which stack to bring up to date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncRequest {
    /// The stack's base moved (typically the bottom branch was squash-merged):
    /// move the chain between `base` and `head` onto `new_base`.
    Rebase {
        base: String,
        new_base: String,
        head: String,
    },

    /// `branch` was rewritten from `previous_tip`: replay its dependents up to
    /// `head` onto its current tip.
    ContentChanged {
        branch: String,
        previous_tip: Oid,
        head: String,
    },
}

impl SyncRequest {
    fn base(&self) -> &str {
        match self {
            Self::Rebase { base, .. } => base,
            Self::ContentChanged { branch, .. } => branch,
        }
    }

    fn head(&self) -> &str {
        match self {
            Self::Rebase { head, .. } | Self::ContentChanged { head, .. } => head,
        }
    }
}

/// Per-run options.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Push moved branches once the rewrite succeeds.
    pub push: bool,

    /// Remote to push to.
    pub remote: String,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            push: true,
            remote: "origin".into(),
        }
    }
}

/// How a run ended.
#[derive(Debug)]
pub enum RunState {
    Done,
    AwaitingConflictResolution(Box<SyncCheckpoint>),
    Failed { phase: Phase, error: Error },
}

/// Final state of one branch, as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchState {
    Moved,
    Pushed,
    Pending,
    Unchanged,
    Conflict,
    Stale,
    Failed,
}

impl BranchState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Moved => "moved",
            Self::Pushed => "pushed",
            Self::Pending => "pending",
            Self::Unchanged => "unchanged",
            Self::Conflict => "conflict",
            Self::Stale => "stale",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for BranchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a caller needs to know about a finished run.
#[derive(Debug)]
pub struct SyncReport {
    /// Base the stack was resolved against.
    pub base: String,

    /// Chain branches, bottom to top.
    pub chain: Vec<String>,

    /// Branch moves confirmed by this run (including resumed ones).
    pub moved: Vec<BranchUpdate>,

    pub unchanged: Vec<String>,
    pub pending: Vec<String>,
    pub push: Option<PushReport>,

    /// Every phase entered, in order.
    pub history: Vec<Phase>,

    pub state: RunState,
}

impl SyncReport {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.state, RunState::Done)
    }

    /// Phase the run stopped in: `planning` for conflicts, the failing phase
    /// for failures, `done` otherwise.
    #[must_use]
    pub const fn stage(&self) -> Phase {
        match &self.state {
            RunState::Done => Phase::Done,
            RunState::AwaitingConflictResolution(_) => Phase::Planning,
            RunState::Failed { phase, .. } => *phase,
        }
    }

    #[must_use]
    pub const fn reason(&self) -> Option<ReasonCode> {
        match &self.state {
            RunState::Done => None,
            RunState::AwaitingConflictResolution(_) => Some(ReasonCode::Conflict),
            RunState::Failed { error, .. } => Some(error.reason()),
        }
    }

    #[must_use]
    pub const fn checkpoint(&self) -> Option<&SyncCheckpoint> {
        match &self.state {
            RunState::AwaitingConflictResolution(checkpoint) => Some(checkpoint),
            _ => None,
        }
    }

    #[must_use]
    pub const fn error(&self) -> Option<&Error> {
        match &self.state {
            RunState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Branches that were pushed.
    #[must_use]
    pub fn pushed(&self) -> Vec<String> {
        self.push.as_ref().map(PushReport::pushed).unwrap_or_default()
    }

    /// State of every chain branch, bottom to top.
    #[must_use]
    pub fn branch_states(&self) -> Vec<(BranchState, String)> {
        let conflict = self.checkpoint().map(|c| c.conflict.branch.as_str());
        let failed = match self.error() {
            Some(Error::PartialRewrite { failed, .. }) => failed.as_deref(),
            _ => None,
        };

        self.chain
            .iter()
            .map(|name| {
                let state = if conflict == Some(name.as_str()) {
                    BranchState::Conflict
                } else if failed == Some(name.as_str()) {
                    BranchState::Failed
                } else if self.moved.iter().any(|u| &u.branch == name) {
                    match self.push.as_ref().and_then(|p| p.outcome(name)) {
                        Some(PushOutcome::Pushed { .. }) => BranchState::Pushed,
                        Some(PushOutcome::Stale { .. }) => BranchState::Stale,
                        Some(PushOutcome::Failed(_)) => BranchState::Failed,
                        _ => BranchState::Moved,
                    }
                } else if self.unchanged.contains(name) {
                    BranchState::Unchanged
                } else {
                    BranchState::Pending
                };
                (state, name.clone())
            })
            .collect()
    }
}

/// Outcome of abandoning a parked run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbortReport {
    /// Branches put back on their original tips.
    pub restored: Vec<String>,

    /// Branches that changed since the run and were left alone.
    pub left: Vec<String>,
}

/// Run-wide facts carried from resolution to the end of the run.
struct Context {
    base: String,
    head: String,
    old_base: Oid,
    new_base: Oid,
    branches: Vec<ChainBranch>,
    unchanged: Vec<String>,
    expected: RemoteTips,
}

/// A run in progress.
struct Run {
    phase: Phase,
    report: SyncReport,
}

impl Run {
    fn new(base: &str) -> Self {
        Self {
            phase: Phase::Idle,
            report: SyncReport {
                base: base.to_string(),
                chain: Vec::new(),
                moved: Vec::new(),
                unchanged: Vec::new(),
                pending: Vec::new(),
                push: None,
                history: vec![Phase::Idle],
                state: RunState::Done,
            },
        }
    }

    fn enter(&mut self, phase: Phase) {
        tracing::info!(from = %self.phase, to = %phase, "sync phase");
        self.phase = phase;
        self.report.history.push(phase);
    }

    fn fail(mut self, error: Error) -> SyncReport {
        tracing::warn!(phase = %self.phase, reason = %error.reason(), %error, "sync failed");
        let phase = self.phase;
        self.enter(Phase::Failed);
        self.report.state = RunState::Failed { phase, error };
        self.report
    }

    fn done(mut self) -> SyncReport {
        self.enter(Phase::Done);
        self.report.state = RunState::Done;
        self.report
    }
}

/// Drives a sync run against one repository.
pub struct Orchestrator<'a, R: RemoteOps> {
    git: &'a R,
    locks: &'a LockTable,
    options: SyncOptions,
    cancel: CancelToken,
    read_retries: u32,
}

impl<'a, R: RemoteOps> Orchestrator<'a, R> {
    pub fn new(git: &'a R, locks: &'a LockTable, options: SyncOptions) -> Self {
        Self {
            git,
            locks,
            options,
            cancel: CancelToken::new(),
            read_retries: DEFAULT_READ_RETRIES,
        }
    }

    /// Use a shared cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub const fn with_read_retries(mut self, attempts: u32) -> Self {
        self.read_retries = attempts;
        self
    }

    fn inspector(&self) -> HistoryInspector<'a, R> {
        HistoryInspector::new(self.git).with_retries(self.read_retries)
    }

    fn synchronizer(&self) -> RemoteSynchronizer<'a, R> {
        RemoteSynchronizer::new(self.git, self.options.remote.clone(), self.locks)
    }

    /// Carry out a request from start to finish.
    pub fn run(&self, request: &SyncRequest) -> SyncReport {
        let inspector = self.inspector();
        let mut run = Run::new(request.base());

        run.enter(Phase::Resolving);
        let (chain, new_base, _guard) = match self.resolve_locked(&inspector, request) {
            Ok(resolved) => resolved,
            Err(err) => return run.fail(err),
        };
        run.report.chain = chain.names();

        let expected = match self.synchronizer().observe(&chain.names()) {
            Ok(tips) => tips,
            Err(err) => return run.fail(err),
        };

        run.enter(Phase::Planning);
        let plan = match plan::plan_rewrite(&inspector, &chain, new_base, &self.cancel) {
            Ok(plan) => plan,
            Err(err) => return run.fail(err),
        };

        let context = Context {
            base: chain.base.clone(),
            head: request.head().to_string(),
            old_base: chain.base_tip,
            new_base,
            branches: chain.branches,
            unchanged: Vec::new(),
            expected,
        };
        self.carry_out(run, &context, plan, Vec::new())
    }

    /// Continue a run parked on a conflict.
    ///
    /// The conflicting branch counts as resolved once it has moved and
    /// descends from the rewritten tip of the branch below it (or the new
    /// base). Until then the run stays parked. Branches above it that an
    /// earlier resume already moved must still be where it left them.
    pub fn resume(&self, checkpoint: &SyncCheckpoint) -> SyncReport {
        let inspector = self.inspector();
        let mut run = Run::new(&checkpoint.base);
        let names: Vec<String> = checkpoint.branches.iter().map(|b| b.name.clone()).collect();
        run.report.chain.clone_from(&names);
        run.report.moved.clone_from(&checkpoint.moved);
        run.report.unchanged.clone_from(&checkpoint.unchanged);

        run.enter(Phase::Resolving);
        let _guard = match self.locks.acquire(LockKey::local(names.iter().cloned())) {
            Ok(guard) => guard,
            Err(err) => return run.fail(err),
        };

        let conflict = &checkpoint.conflict;
        let Some(position) = names.iter().position(|n| *n == conflict.branch) else {
            return run.fail(Error::CheckpointMismatch(format!(
                "'{}' is not part of the saved stack",
                conflict.branch
            )));
        };

        let mut moved = checkpoint.moved.clone();
        if moved_to(&moved, &conflict.branch).is_none() {
            let original = checkpoint.branches[position].tip;
            let floor = checkpoint.conflict_floor();
            let tip = match inspector.tip_of(&conflict.branch) {
                Ok(tip) => tip,
                Err(err) => return run.fail(err),
            };
            let resolved = tip != original
                && match inspector.is_ancestor(floor, tip) {
                    Ok(resolved) => resolved,
                    Err(err) => return run.fail(err),
                };
            if !resolved {
                tracing::info!(branch = %conflict.branch, %floor, "conflict not resolved yet");
                run.report.pending = names[position..].to_vec();
                run.enter(Phase::AwaitingConflictResolution);
                run.report.state =
                    RunState::AwaitingConflictResolution(Box::new(checkpoint.clone()));
                return run.report;
            }

            moved.push(BranchUpdate {
                branch: conflict.branch.clone(),
                from: original,
                to: tip,
                absorbed: tip == floor,
            });
            run.report.moved.clone_from(&moved);
        }

        // Skip past everything from the conflict up that is already moved
        let mut cursor = None;
        let mut next = position;
        while let Some(branch) = checkpoint.branches.get(next) {
            let Some(to) = moved_to(&moved, &branch.name) else {
                break;
            };
            if let Err(err) = expect_tip(&inspector, &branch.name, to) {
                return run.fail(err);
            }
            cursor = Some(PlanCursor {
                original: branch.tip,
                rewritten: to,
            });
            next += 1;
        }
        let Some(cursor) = cursor else {
            return run.fail(Error::CheckpointMismatch(format!(
                "no move recorded for '{}'",
                conflict.branch
            )));
        };

        let remaining = &checkpoint.branches[next..];
        for branch in remaining {
            if let Err(err) = expect_tip(&inspector, &branch.name, branch.tip) {
                return run.fail(err);
            }
        }

        run.enter(Phase::Planning);
        let plan = match plan::plan_from(&inspector, remaining, cursor, &self.cancel) {
            Ok(plan) => plan,
            Err(err) => return run.fail(err),
        };

        let context = Context {
            base: checkpoint.base.clone(),
            head: checkpoint.head.clone(),
            old_base: checkpoint.old_base,
            new_base: checkpoint.new_base,
            branches: checkpoint.branches.clone(),
            unchanged: checkpoint.unchanged.clone(),
            expected: checkpoint.expected_tips(),
        };
        self.carry_out(run, &context, plan, moved)
    }

    /// Put every branch moved by a parked run back where it was.
    ///
    /// Each restore is compare-and-swap against the tip the run moved it to;
    /// a branch that changed since is left alone and reported.
    ///
    /// # Errors
    /// Returns a git error other than a moved reference; branches restored
    /// before it stay restored.
    pub fn abort(&self, checkpoint: &SyncCheckpoint) -> Result<AbortReport> {
        let names = checkpoint.branches.iter().map(|b| b.name.clone());
        let _guard = self.locks.acquire(LockKey::local(names))?;

        let mut report = AbortReport::default();
        for update in checkpoint.moved.iter().rev() {
            match self.git.move_branch(&update.branch, update.from, update.to) {
                Ok(()) => {
                    tracing::info!(branch = %update.branch, tip = %update.from, "restored");
                    report.restored.push(update.branch.clone());
                }
                Err(spire_git::Error::RefMoved { .. } | spire_git::Error::BranchNotFound(_)) => {
                    tracing::warn!(branch = %update.branch, "changed since the run, left alone");
                    report.left.push(update.branch.clone());
                }
                Err(err) => return Err(err.into()),
            }
        }
        report.restored.reverse();
        report.left.reverse();
        Ok(report)
    }

    /// Resolve `request` and lock its chain.
    ///
    /// The chain is resolved again once the locks are held, so every tip
    /// the run works from was read under the lock.
    fn resolve_locked(
        &self,
        inspector: &HistoryInspector<'a, R>,
        request: &SyncRequest,
    ) -> Result<(DependencyChain, Oid, LockGuard)> {
        let mut names = self.resolve(inspector, request)?.0.names();
        for _ in 0..LOCK_ATTEMPTS {
            let guard = self.locks.acquire(LockKey::local(names.iter().cloned()))?;
            let (chain, new_base) = self.resolve(inspector, request)?;
            let unlocked: Vec<String> = chain
                .names()
                .into_iter()
                .filter(|name| !names.contains(name))
                .collect();
            if unlocked.is_empty() {
                return Ok((chain, new_base, guard));
            }
            drop(guard);
            tracing::debug!(?unlocked, "stack grew while locking");
            names.extend(unlocked);
        }
        Err(Error::StackChanged(names))
    }

    fn resolve(
        &self,
        inspector: &HistoryInspector<'a, R>,
        request: &SyncRequest,
    ) -> Result<(DependencyChain, Oid)> {
        match request {
            SyncRequest::Rebase {
                base,
                new_base,
                head,
            } => {
                let new_tip = inspector.resolve_revision(new_base)?;
                let chain = resolver::resolve_stack(inspector, base, head)?;
                Ok((chain, new_tip))
            }
            SyncRequest::ContentChanged {
                branch,
                previous_tip,
                head,
            } => {
                let current = inspector.tip_of(branch)?;
                let head_tip = inspector.resolve_revision(head)?;
                let chain =
                    resolver::resolve_chain(inspector, branch, *previous_tip, head, head_tip)?;
                Ok((chain, current))
            }
        }
    }

    /// Execute `plan`, then either park on its conflict or push.
    fn carry_out(
        &self,
        mut run: Run,
        context: &Context,
        plan: RewritePlan,
        mut moved: Vec<BranchUpdate>,
    ) -> SyncReport {
        run.report.unchanged = context.unchanged.clone();
        run.report.unchanged.extend(plan.unchanged.iter().cloned());

        if !plan.is_noop() {
            run.enter(Phase::Executing);
            match exec::apply(self.git, &plan, &self.cancel) {
                Ok(applied) => moved.extend(applied.moved),
                Err(err) => {
                    let confirmed = match &err {
                        Error::PartialRewrite { moved, .. } | Error::Cancelled { moved, .. } => {
                            moved.clone()
                        }
                        _ => Vec::new(),
                    };
                    moved.extend(
                        plan.updates
                            .iter()
                            .filter(|u| confirmed.contains(&u.branch))
                            .cloned(),
                    );
                    run.report.moved = moved;
                    return run.fail(err);
                }
            }
        }
        run.report.moved.clone_from(&moved);

        if let Some(conflict) = plan.conflict {
            run.report.pending = plan.pending;
            let checkpoint = SyncCheckpoint {
                created_at: Utc::now(),
                base: context.base.clone(),
                head: context.head.clone(),
                old_base: context.old_base,
                new_base: context.new_base,
                branches: context.branches.clone(),
                moved,
                unchanged: run.report.unchanged.clone(),
                conflict,
                remote_tips: context
                    .expected
                    .iter()
                    .map(|(branch, tip)| RemoteTip {
                        branch: branch.clone(),
                        tip: *tip,
                    })
                    .collect(),
            };
            run.enter(Phase::AwaitingConflictResolution);
            run.report.state = RunState::AwaitingConflictResolution(Box::new(checkpoint));
            return run.report;
        }

        if !self.options.push || moved.is_empty() {
            return run.done();
        }

        let names: Vec<String> = moved.iter().map(|u| u.branch.clone()).collect();
        if self.cancel.is_cancelled() {
            return run.fail(Error::Cancelled {
                moved: names,
                pending: Vec::new(),
            });
        }

        run.enter(Phase::Synchronizing);
        let report = self
            .synchronizer()
            .push(&names, &context.expected, &self.cancel);
        let (stale, failed, skipped) = (report.stale(), report.failed(), report.skipped());
        run.report.push = Some(report);

        if !stale.is_empty() {
            return run.fail(Error::StaleRemote { branches: stale });
        }
        if !failed.is_empty() {
            return run.fail(Error::PushFailed { branches: failed });
        }
        if !skipped.is_empty() {
            return run.fail(Error::Cancelled {
                moved: names,
                pending: skipped,
            });
        }

        run.done()
    }
}

/// Where this sync last moved `branch`, if it did.
fn moved_to(moved: &[BranchUpdate], branch: &str) -> Option<Oid> {
    moved.iter().rev().find(|u| u.branch == branch).map(|u| u.to)
}

fn expect_tip<R: RemoteOps>(
    inspector: &HistoryInspector<'_, R>,
    branch: &str,
    tip: Oid,
) -> Result<()> {
    if inspector.tip_of(branch)? == tip {
        Ok(())
    } else {
        Err(Error::CheckpointMismatch(format!(
            "'{branch}' moved since the sync stopped"
        )))
    }
}
