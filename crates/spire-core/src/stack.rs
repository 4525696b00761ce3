//! Stack data model: an ordered chain of dependent branches above a base.

use serde::{Deserialize, Serialize};
use spire_git::Oid;

/// A branch in a resolved chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainBranch {
    /// Branch name.
    pub name: String,

    /// Tip commit at resolution time.
    #[serde(with = "crate::serde_oid")]
    pub tip: Oid,

    /// Commits reachable from the tip but not from the base.
    pub depth: usize,
}

impl ChainBranch {
    pub fn new(name: impl Into<String>, tip: Oid, depth: usize) -> Self {
        Self {
            name: name.into(),
            tip,
            depth,
        }
    }
}

/// Branches between a base and a head, bottom to top.
///
/// The base is an ancestor of the first branch and every branch is an
/// ancestor of the next. A chain is a snapshot; it is rebuilt on every query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyChain {
    /// Name (or revision) the chain was resolved against.
    pub base: String,

    /// Commit the chain was resolved against.
    #[serde(with = "crate::serde_oid")]
    pub base_tip: Oid,

    /// Branches ordered by depth, ties by name.
    pub branches: Vec<ChainBranch>,
}

impl DependencyChain {
    /// An empty chain over `base`.
    pub fn empty(base: impl Into<String>, base_tip: Oid) -> Self {
        Self {
            base: base.into(),
            base_tip,
            branches: Vec::new(),
        }
    }

    /// Number of branches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.branches.len()
    }

    /// Check if the chain is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Branch names, bottom to top.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.branches.iter().map(|b| b.name.clone()).collect()
    }

    /// Find a branch by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&ChainBranch> {
        self.branches.iter().find(|b| b.name == name)
    }

    /// Position of a branch in the chain.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.branches.iter().position(|b| b.name == name)
    }

    /// The topmost branch.
    #[must_use]
    pub fn top(&self) -> Option<&ChainBranch> {
        self.branches.last()
    }

    /// The branch directly below `name`, if it is not the bottom.
    #[must_use]
    pub fn below(&self, name: &str) -> Option<&ChainBranch> {
        let pos = self.position(name)?;
        pos.checked_sub(1).and_then(|i| self.branches.get(i))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn oid(n: u8) -> Oid {
        Oid::from_bytes(&[n; 20]).unwrap()
    }

    fn sample_chain() -> DependencyChain {
        DependencyChain {
            base: "main".into(),
            base_tip: oid(0),
            branches: vec![
                ChainBranch::new("b1", oid(1), 1),
                ChainBranch::new("b2", oid(2), 2),
                ChainBranch::new("b3", oid(3), 3),
            ],
        }
    }

    #[test]
    fn test_navigation() {
        let chain = sample_chain();

        assert_eq!(chain.len(), 3);
        assert_eq!(chain.names(), vec!["b1", "b2", "b3"]);
        assert_eq!(chain.position("b2"), Some(1));
        assert_eq!(chain.below("b2").map(|b| b.name.as_str()), Some("b1"));
        assert!(chain.below("b1").is_none());
        assert_eq!(chain.top().map(|b| b.tip), Some(oid(3)));
        assert!(chain.find("b9").is_none());
    }

    #[test]
    fn test_serializes_ids_as_hex() {
        let chain = sample_chain();
        let json = serde_json::to_string(&chain).unwrap();
        assert!(json.contains(&oid(1).to_string()));

        let loaded: DependencyChain = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, chain);
    }
}
