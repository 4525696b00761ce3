//! `spire list-stack` command - print a stack bottom to top.

use anyhow::Result;
use spire_core::{HistoryInspector, resolver};

use super::utils;
use crate::output;

/// Run the list-stack command.
pub fn run(base: Option<&str>, head: Option<&str>, json: bool) -> Result<i32> {
    let (repo, _state, config) = utils::open_repo_and_state()?;
    let base = config.base(base);
    let inspector = HistoryInspector::new(&repo).with_retries(config.sync.read_retries);

    let head = utils::resolve_head(&repo, &inspector, base, head)?;
    let chain = resolver::resolve_stack(&inspector, base, &head)?;

    if json {
        output::essential(&serde_json::to_string_pretty(&chain)?);
        return Ok(0);
    }

    if chain.is_empty() {
        output::info(&format!("No branches between {base} and {head}"));
    }
    for branch in &chain.branches {
        output::essential(&branch.name);
    }
    Ok(0)
}
