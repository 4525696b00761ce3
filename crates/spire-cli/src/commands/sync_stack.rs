//! `spire sync-stack` command - move a stack onto its new base.

use std::collections::HashSet;

use anyhow::{Context, Result};
use spire_core::{AbortReport, HistoryInspector, ReasonCode, SyncOptions, SyncReport, SyncRequest};
use spire_git::Repository;
use spire_github::{Auth, GitHubClient};

use super::SyncStackArgs;
use super::utils;
use crate::output;
use crate::services::{Landed, LandedService, RetargetService, SyncStackService};

/// Run the sync-stack command.
pub fn run(args: &SyncStackArgs) -> Result<i32> {
    let (repo, state, config) = utils::open_repo_and_state()?;

    let options = SyncOptions {
        push: config.sync.push && !args.no_push,
        remote: config.remote(args.remote.as_deref()).to_string(),
    };
    let service = SyncStackService::new(&repo, &state, options.clone(), utils::cancel_on_ctrl_c())
        .with_read_retries(config.sync.read_retries);

    if args.abort {
        let report = service.abort()?;
        print_abort(&report);
        return Ok(0);
    }

    repo.require_clean()?;

    let api_url = config
        .github
        .api_url
        .as_deref()
        .unwrap_or(GitHubClient::DEFAULT_API_URL);

    let report = if args.resume {
        output::info("Resuming sync...");
        service.resume()?
    } else {
        let inspector = HistoryInspector::new(&repo).with_retries(config.sync.read_retries);
        let landed = match args.merged_pr {
            Some(number) => Some(landed_pr(&repo, &options.remote, api_url, number)?),
            None => None,
        };
        let base = config.base(
            args.base
                .as_deref()
                .or_else(|| landed.as_ref().map(|l| l.base.as_str())),
        );
        let new_base = match &landed {
            Some(landed) => {
                inspector.resolve_revision(&landed.commit).with_context(|| {
                    format!(
                        "merge commit {} is not in this clone - fetch {} first",
                        landed.commit, options.remote
                    )
                })?;
                landed.commit.clone()
            }
            None => args.new_base.clone().unwrap_or_else(|| base.to_string()),
        };
        let request = build_request(&repo, &inspector, args, base, new_base)?;
        service.run(&request)?
    };

    if args.json {
        output::essential(&serde_json::to_string_pretty(&report_json(&report))?);
    } else {
        print_report(&report);
    }

    if report.is_success() && args.retarget_prs {
        let absorbed: HashSet<String> = report
            .moved
            .iter()
            .filter(|u| u.absorbed)
            .map(|u| u.branch.clone())
            .collect();
        if !absorbed.is_empty() {
            retarget_prs(&repo, &options.remote, api_url, &report, &absorbed)?;
        }
    }

    Ok(report.reason().map_or(0, ReasonCode::exit_code))
}

fn build_request(
    repo: &Repository,
    inspector: &HistoryInspector<'_, Repository>,
    args: &SyncStackArgs,
    base: &str,
    new_base: String,
) -> Result<SyncRequest> {
    if let (Some(branch), Some(previous)) = (&args.changed, &args.previous) {
        let previous_tip = inspector.resolve_revision(previous)?;
        let head = match &args.head {
            Some(head) => head.clone(),
            None => repo.current_branch()?,
        };
        return Ok(SyncRequest::ContentChanged {
            branch: branch.clone(),
            previous_tip,
            head,
        });
    }

    let head = utils::resolve_head(repo, inspector, base, args.head.as_deref())?;
    Ok(SyncRequest::Rebase {
        base: base.to_string(),
        new_base,
        head,
    })
}

fn print_report(report: &SyncReport) {
    if let Some(reason) = report.reason() {
        output::reason(reason);
        output::stage(report.stage());
    }
    for (state, branch) in report.branch_states() {
        output::branch_state(state, &branch);
    }

    if let Some(checkpoint) = report.checkpoint() {
        let conflict = &checkpoint.conflict;
        output::warn(&format!(
            "Conflict replaying {} onto {} in '{}'",
            &conflict.commit.to_string()[..8],
            &conflict.onto.to_string()[..8],
            conflict.branch
        ));
        for file in &conflict.files {
            output::detail(&format!("  → {file}"));
        }
        let onto = checkpoint.branch_below_conflict().map_or_else(
            || format!("the new base ({})", &checkpoint.new_base.to_string()[..8]),
            |below| format!("'{}'", below.name),
        );
        output::info(&format!(
            "Rebase '{}' onto {onto} by hand, then run: spire sync-stack --resume",
            conflict.branch
        ));
        output::info("Or undo the moved branches with: spire sync-stack --abort");
        return;
    }

    match report.error() {
        Some(err) => output::error(&err.to_string()),
        None if report.moved.is_empty() => output::success("Stack is already up-to-date"),
        None => output::success(&format!(
            "Synced {} branch(es), pushed {}",
            report.moved.len(),
            report.pushed().len()
        )),
    }
}

fn report_json(report: &SyncReport) -> serde_json::Value {
    let branches: Vec<_> = report
        .branch_states()
        .into_iter()
        .map(|(state, branch)| serde_json::json!({ "branch": branch, "state": state }))
        .collect();

    serde_json::json!({
        "base": report.base,
        "success": report.is_success(),
        "reason": report.reason().map(ReasonCode::as_str),
        "stage": report.stage(),
        "history": report.history,
        "branches": branches,
        "moved": report.moved,
        "push": report.push,
        "conflict": report.checkpoint().map(|c| &c.conflict),
        "error": report.error().map(ToString::to_string),
    })
}

fn print_abort(report: &AbortReport) {
    for branch in &report.restored {
        output::essential(&format!("restored {branch}"));
    }
    for branch in &report.left {
        output::warn(&format!("'{branch}' changed since the sync stopped - left alone"));
    }
    output::success(&format!(
        "Sync aborted - restored {} branch(es)",
        report.restored.len()
    ));
}

/// Client plus owner and name of the GitHub repository behind `remote`.
fn github(repo: &Repository, remote: &str, api_url: &str) -> Result<(GitHubClient, String, String)> {
    let url = repo.remote_url(remote)?;
    let (owner, name) = Repository::parse_github_remote(&url)?;
    let client = GitHubClient::with_base_url(&Auth::auto(), api_url)
        .context("Failed to connect to GitHub")?;
    Ok((client, owner, name))
}

fn landed_pr(repo: &Repository, remote: &str, api_url: &str, number: u64) -> Result<Landed> {
    let (client, owner, name) = github(repo, remote, api_url)?;
    let runtime = tokio::runtime::Runtime::new()?;
    let landed = runtime.block_on(LandedService::new(&client, owner, name).landed(number))?;
    output::detail(&format!(
        "#{number} landed on {} as {}",
        landed.base,
        &landed.commit[..landed.commit.len().min(8)]
    ));
    Ok(landed)
}

fn retarget_prs(
    repo: &Repository,
    remote: &str,
    api_url: &str,
    report: &SyncReport,
    absorbed: &HashSet<String>,
) -> Result<()> {
    let (client, owner, name) = github(repo, remote, api_url)?;

    let runtime = tokio::runtime::Runtime::new()?;
    let service = RetargetService::new(&client, owner, name);
    let done = runtime.block_on(service.retarget(&report.base, &report.chain, absorbed))?;

    for pr in &done {
        output::info(&format!("Retargeted #{} ({}) to {}", pr.number, pr.head, pr.to));
    }
    if done.is_empty() {
        output::detail("No pull requests needed retargeting");
    }
    Ok(())
}

