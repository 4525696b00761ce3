//! Command-line interface definition.

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

pub mod completions;
pub mod list_stack;
pub mod push_stack;
pub mod sync_stack;
pub mod utils;

/// Keep stacked branches in sync when their base moves.
#[derive(Debug, Parser)]
#[command(name = "spire", version, about, propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Show debug logging on stderr.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Only print machine-readable results.
    #[arg(long, short, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the branches of a stack, bottom to top.
    ListStack {
        /// Branch the stack is built on [default: from config, else main].
        #[arg(long)]
        base: Option<String>,

        /// Top of the stack [default: inferred from the current branch].
        #[arg(long)]
        head: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Rebase a stack onto its moved base and push the result.
    SyncStack(SyncStackArgs),

    /// Push every branch of a stack, refusing to overwrite remote changes.
    PushStack {
        #[arg(long)]
        base: Option<String>,

        #[arg(long)]
        head: Option<String>,

        /// Remote to push to [default: from config, else origin].
        #[arg(long)]
        remote: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Args)]
pub struct SyncStackArgs {
    /// Branch the stack was built on.
    #[arg(long)]
    pub base: Option<String>,

    /// Revision to move the stack onto [default: the base branch's tip].
    #[arg(long)]
    pub new_base: Option<String>,

    /// Move onto the commit this merged pull request landed as.
    ///
    /// The PR's base branch is the stack base unless `--base` is given.
    #[arg(long, value_name = "NUMBER", conflicts_with = "new_base")]
    pub merged_pr: Option<u64>,

    /// Top of the stack [default: inferred from the current branch].
    #[arg(long)]
    pub head: Option<String>,

    /// Replay the dependents of this rewritten branch instead of rebasing.
    #[arg(long, requires = "previous", conflicts_with_all = ["base", "new_base", "merged_pr"])]
    pub changed: Option<String>,

    /// Tip the `--changed` branch had before it was rewritten.
    #[arg(long, requires = "changed")]
    pub previous: Option<String>,

    /// Continue a sync stopped on a conflict.
    #[arg(long, conflicts_with = "abort")]
    pub resume: bool,

    /// Abandon a sync stopped on a conflict, restoring moved branches.
    #[arg(long)]
    pub abort: bool,

    /// Rewrite locally without pushing.
    #[arg(long)]
    pub no_push: bool,

    #[arg(long)]
    pub remote: Option<String>,

    /// Point PRs based on absorbed branches at their new base.
    #[arg(long)]
    pub retarget_prs: bool,

    #[arg(long)]
    pub json: bool,
}
