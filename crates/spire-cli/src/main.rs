//! Spire CLI - keep stacked branches in sync when their base moves.

use clap::Parser;
use tracing::Level;

mod commands;
mod output;
mod services;

use commands::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    output::set_quiet(cli.quiet);
    init_tracing(cli.verbose);

    let result = match &cli.command {
        Commands::ListStack { base, head, json } => {
            commands::list_stack::run(base.as_deref(), head.as_deref(), *json)
        }
        Commands::SyncStack(args) => commands::sync_stack::run(args),
        Commands::PushStack {
            base,
            head,
            remote,
            json,
        } => commands::push_stack::run(base.as_deref(), head.as_deref(), remote.as_deref(), *json),
        Commands::Completions { shell } => commands::completions::run(*shell),
    };

    match result {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            let reason = commands::utils::reason_of(&e);
            output::reason(reason);
            output::error(&format!("{e:#}"));
            std::process::exit(reason.exit_code());
        }
    }
}

/// Log to stderr: warnings by default, debug detail with `--verbose`.
fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}
