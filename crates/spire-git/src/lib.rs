//! # spire-git
//!
//! Git operations abstraction layer for Spire, built on git2-rs.
//! Provides the narrow command interface the sync engine consumes:
//! ancestry queries, single-commit replay, compare-and-swap branch moves
//! and lease-checked pushes.

mod error;
#[cfg(any(test, feature = "test-util"))]
mod memory;
mod remote;
mod replay;
mod repository;
mod traits;

pub use error::{Error, Result};
pub use git2::Oid;
#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryRepo;
pub use replay::Replay;
pub use repository::Repository;
pub use traits::{GitOps, RemoteOps};
