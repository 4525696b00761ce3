//! Terminal output formatting utilities.
//!
//! Human-facing messages honour quiet mode. Machine-readable result lines
//! (`reason:`, `stage:`, per-branch states) always print to stdout.

use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use spire_core::{BranchState, Phase, PushOutcome, ReasonCode};

static QUIET_MODE: AtomicBool = AtomicBool::new(false);

/// Set quiet mode globally. Call once at startup.
pub fn set_quiet(quiet: bool) {
    QUIET_MODE.store(quiet, Ordering::Relaxed);
}

fn is_quiet() -> bool {
    QUIET_MODE.load(Ordering::Relaxed)
}

/// Print a success message (suppressed in quiet mode).
pub fn success(msg: &str) {
    if !is_quiet() {
        println!("{} {}", "✓".green(), msg);
    }
}

/// Print an error message (always prints to stderr).
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a warning message (always prints to stderr).
pub fn warn(msg: &str) {
    eprintln!("{} {}", "!".yellow(), msg);
}

/// Print an info message (suppressed in quiet mode).
pub fn info(msg: &str) {
    if !is_quiet() {
        println!("{} {}", "→".blue(), msg);
    }
}

/// Print a detail line without prefix (suppressed in quiet mode).
pub fn detail(msg: &str) {
    if !is_quiet() {
        println!("{msg}");
    }
}

/// Print essential machine-readable output (always prints).
pub fn essential(msg: &str) {
    println!("{msg}");
}

/// `reason: <CODE>` line.
pub fn reason(code: ReasonCode) {
    essential(&format!("reason: {code}"));
}

/// `stage: <phase>` line.
pub fn stage(phase: Phase) {
    essential(&format!("stage: {phase}"));
}

/// `<state> <branch>` line.
pub fn branch_state(state: BranchState, branch: &str) {
    essential(&format!("{state} {branch}"));
}

/// `<branch> <status>` line.
pub fn push_outcome(branch: &str, outcome: &PushOutcome) {
    essential(&format!("{branch} {}", outcome.label()));
}
