//! `spire push-stack` command - push a stack with lease checks.

use anyhow::Result;
use spire_core::{HistoryInspector, ReasonCode, RemoteSynchronizer, StateStore, resolver};

use super::utils;
use crate::output;

/// Run the push-stack command.
pub fn run(
    base: Option<&str>,
    head: Option<&str>,
    remote: Option<&str>,
    json: bool,
) -> Result<i32> {
    let (repo, state, config) = utils::open_repo_and_state()?;
    let base = config.base(base);
    let remote = config.remote(remote);
    let inspector = HistoryInspector::new(&repo).with_retries(config.sync.read_retries);

    let head = utils::resolve_head(&repo, &inspector, base, head)?;
    let chain = resolver::resolve_stack(&inspector, base, &head)?;
    let names = chain.names();

    let cancel = utils::cancel_on_ctrl_c();
    let locks = state.lock_table();
    let synchronizer = RemoteSynchronizer::new(&repo, remote, &locks);
    let expected = synchronizer.observe(&names)?;
    let report = synchronizer.push(&names, &expected, &cancel);

    let reason = if report.is_success() {
        None
    } else if !report.stale().is_empty() {
        Some(ReasonCode::StaleRemote)
    } else if !report.skipped().is_empty() {
        Some(ReasonCode::Cancelled)
    } else {
        Some(ReasonCode::Error)
    };

    if json {
        let body = serde_json::json!({
            "remote": remote,
            "reason": reason.map(ReasonCode::as_str),
            "results": report.results,
        });
        output::essential(&serde_json::to_string_pretty(&body)?);
    } else {
        if let Some(reason) = reason {
            output::reason(reason);
        }
        for result in &report.results {
            output::push_outcome(&result.branch, &result.outcome);
            if let spire_core::PushOutcome::Failed(detail) = &result.outcome {
                output::warn(&format!("{}: {detail}", result.branch));
            }
        }
        if reason.is_none() && !names.is_empty() {
            output::success(&format!("Pushed {} to {remote}", names.join(", ")));
        }
    }

    Ok(reason.map_or(0, ReasonCode::exit_code))
}
