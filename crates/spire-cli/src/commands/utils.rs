use anyhow::{Context, Result};
use spire_core::{CancelToken, Config, HistoryInspector, ReasonCode, State, resolver};
use spire_git::Repository;

/// Open the repository in the current directory with its state and config.
pub fn open_repo_and_state() -> Result<(Repository, State, Config)> {
    let repo = Repository::open_current().context("Not inside a git repository")?;
    let workdir = repo.workdir().context("Cannot run in bare repository")?;
    let state = State::new(workdir)?;
    let config = state.load_config()?;
    Ok((repo, state, config))
}

/// Use `head` when given, otherwise infer the stack top from the current branch.
pub fn resolve_head(
    repo: &Repository,
    inspector: &HistoryInspector<'_, Repository>,
    base: &str,
    head: Option<&str>,
) -> Result<String> {
    if let Some(head) = head {
        return Ok(head.to_string());
    }
    let current = repo.current_branch().ok();
    let head = resolver::find_stack_head(inspector, base, current.as_deref())?;
    tracing::debug!(%head, "inferred stack head");
    Ok(head)
}

/// Token cancelled by Ctrl-C.
///
/// The handler runs on its own thread so commands can stay synchronous.
pub fn cancel_on_ctrl_c() -> CancelToken {
    let token = CancelToken::new();
    let handle = token.clone();

    std::thread::spawn(move || {
        let Ok(runtime) = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        else {
            return;
        };
        runtime.block_on(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, stopping after the current step");
                handle.cancel();
            }
        });
    });

    token
}

/// Reason code for an error that escaped a command.
pub fn reason_of(err: &anyhow::Error) -> ReasonCode {
    if let Some(core) = err.downcast_ref::<spire_core::Error>() {
        return core.reason();
    }
    match err.downcast_ref::<spire_git::Error>() {
        Some(spire_git::Error::BranchNotFound(_) | spire_git::Error::RevisionNotFound(_)) => {
            ReasonCode::UnknownBranch
        }
        Some(spire_git::Error::StaleRemote { .. }) => ReasonCode::StaleRemote,
        _ => ReasonCode::Error,
    }
}
