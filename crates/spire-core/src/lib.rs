//! # spire-core
//!
//! Stack-aware branch sync engine for Spire.
//!
//! A stack is a chain of branches each built on the one below. When the base
//! moves (typically because the bottom branch was squash-merged) the engine
//! resolves the chain from history, plans a replay of every dependent branch,
//! moves the branch references and pushes them with lease checks.

mod cancel;
pub mod config;
mod error;
pub mod exec;
pub mod inspector;
pub mod lock;
pub mod orchestrator;
pub mod plan;
pub mod push;
pub mod resolver;
mod serde_oid;
pub mod stack;
pub mod state;
pub mod traits;

pub use cancel::CancelToken;
pub use config::Config;
pub use error::{Error, ReasonCode, Result};
pub use exec::AppliedResult;
pub use inspector::HistoryInspector;
pub use lock::{LockGuard, LockKey, LockTable};
pub use orchestrator::{
    AbortReport, BranchState, Orchestrator, Phase, RunState, SyncOptions, SyncReport, SyncRequest,
};
pub use plan::{BranchUpdate, PlannedConflict, RewritePlan};
pub use push::{PushOutcome, PushReport, RemoteSynchronizer, RemoteTips};
pub use stack::{ChainBranch, DependencyChain};
pub use state::{State, SyncCheckpoint};
pub use traits::StateStore;
