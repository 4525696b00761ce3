//! Stack resolution: derive the dependency chain between a base and a head.
//!
//! Position in the stack is approximated by the number of commits between the
//! base and each branch tip. The chain is computed from scratch on every call.

use spire_git::{GitOps, Oid};

use crate::error::{Error, Result};
use crate::inspector::HistoryInspector;
use crate::stack::{ChainBranch, DependencyChain};

/// Resolve the chain of branches between `base` and `head`.
///
/// `base` may be a branch name or any revision. If it has moved on since the
/// stack was built (for example a squash landed on it), the chain is resolved
/// against the point where `head` forked from it.
///
/// # Errors
/// Returns `UnknownBranch` if either end cannot be resolved, `NotAncestor` if
/// they share no history or the chain is not linear, and `EmptyStack` if no
/// branch qualifies.
pub fn resolve_stack<G: GitOps>(
    inspector: &HistoryInspector<'_, G>,
    base: &str,
    head: &str,
) -> Result<DependencyChain> {
    let head_tip = inspector.resolve_revision(head)?;
    if head == base {
        return Ok(DependencyChain::empty(base, head_tip));
    }

    let base_tip = resolve_base(inspector, base, head_tip)?;
    resolve_chain(inspector, base, base_tip, head, head_tip)
}

/// The commit a stack ending at `anchor` is built on.
///
/// This is the tip of `base` when it is an ancestor of `anchor`, otherwise the
/// fork point of the two.
///
/// # Errors
/// Returns `NotAncestor` if the two share no history.
pub fn resolve_base<G: GitOps>(
    inspector: &HistoryInspector<'_, G>,
    base: &str,
    anchor: Oid,
) -> Result<Oid> {
    let tip = inspector.resolve_revision(base)?;
    if inspector.is_ancestor(tip, anchor)? {
        return Ok(tip);
    }

    match inspector.merge_base(tip, anchor)? {
        Some(fork) => {
            tracing::debug!(base, %tip, %fork, "base moved, resolving against fork point");
            Ok(fork)
        }
        None => Err(Error::NotAncestor {
            ancestor: base.to_string(),
            descendant: anchor.to_string(),
        }),
    }
}

/// Resolve the chain above a known base commit.
///
/// The branch named `base` is never part of its own chain.
///
/// # Errors
/// See [`resolve_stack`].
pub fn resolve_chain<G: GitOps>(
    inspector: &HistoryInspector<'_, G>,
    base: &str,
    base_tip: Oid,
    head: &str,
    head_tip: Oid,
) -> Result<DependencyChain> {
    if !inspector.is_ancestor(base_tip, head_tip)? {
        return Err(Error::NotAncestor {
            ancestor: base.to_string(),
            descendant: head.to_string(),
        });
    }

    let mut branches = Vec::new();
    for name in inspector.list_branches()? {
        if name == base {
            continue;
        }
        let tip = inspector.tip_of(&name)?;
        if !inspector.is_ancestor(tip, head_tip)? || !inspector.is_ancestor(base_tip, tip)? {
            continue;
        }
        let depth = inspector.ancestor_count(base_tip, tip)?;
        branches.push(ChainBranch::new(name, tip, depth));
    }

    branches.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.name.cmp(&b.name)));

    if branches.is_empty() {
        if head_tip == base_tip {
            return Ok(DependencyChain::empty(base, base_tip));
        }
        return Err(Error::EmptyStack {
            base: base.to_string(),
            head: head.to_string(),
        });
    }

    // A merge-shaped head can pull in branches that are not ancestor-related
    for pair in branches.windows(2) {
        if !inspector.is_ancestor(pair[0].tip, pair[1].tip)? {
            return Err(Error::NotAncestor {
                ancestor: pair[0].name.clone(),
                descendant: pair[1].name.clone(),
            });
        }
    }

    tracing::debug!(base, head, count = branches.len(), "resolved stack");
    Ok(DependencyChain {
        base: base.to_string(),
        base_tip,
        branches,
    })
}

/// Infer the head of the stack built on `base`.
///
/// Candidates are branches above the base that are not strictly below another
/// candidate. When `current` names a branch other than the base, only tops at
/// or above it are considered, and `current` itself wins a tie.
///
/// # Errors
/// Returns `EmptyStack` when nothing sits above the base and
/// `AmbiguousStack` when more than one top exists.
pub fn find_stack_head<G: GitOps>(
    inspector: &HistoryInspector<'_, G>,
    base: &str,
    current: Option<&str>,
) -> Result<String> {
    let current = current.filter(|name| *name != base);
    let anchor = match current {
        Some(name) => Some(inspector.tip_of(name)?),
        None => None,
    };
    let floor = match anchor {
        Some(tip) => resolve_base(inspector, base, tip)?,
        None => inspector.resolve_revision(base)?,
    };

    let mut candidates = Vec::new();
    for name in inspector.list_branches()? {
        if name == base {
            continue;
        }
        let tip = inspector.tip_of(&name)?;
        let above_anchor = match anchor {
            Some(anchor) => inspector.is_ancestor(anchor, tip)?,
            None => tip != floor,
        };
        if above_anchor && inspector.is_ancestor(floor, tip)? {
            candidates.push((name, tip));
        }
    }

    let mut tops = Vec::new();
    for (name, tip) in &candidates {
        let mut covered = false;
        for (_, other) in &candidates {
            if other != tip && inspector.is_ancestor(*tip, *other)? {
                covered = true;
                break;
            }
        }
        if !covered {
            tops.push(name.clone());
        }
    }

    if let Some(current) = current {
        if tops.iter().any(|t| t == current) && tops.len() > 1 {
            let tied = candidates
                .iter()
                .filter(|(name, _)| tops.contains(name))
                .all(|(_, tip)| Some(*tip) == anchor);
            if tied {
                return Ok(current.to_string());
            }
        }
    }

    match tops.len() {
        0 => Err(Error::EmptyStack {
            base: base.to_string(),
            head: current.unwrap_or(base).to_string(),
        }),
        1 => Ok(tops.remove(0)),
        _ => Err(Error::AmbiguousStack {
            base: base.to_string(),
            candidates: tops,
        }),
    }
}
