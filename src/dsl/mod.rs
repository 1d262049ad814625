//! Compact component notation.
//!
//! A card is written as a tree of component symbols:
//!
//! ```text
//! §[δ, Ƀ[ᵬ×2]]
//! ```
//!
//! reads "a Section holding a `DecoratedText` and a `ButtonList` of two
//! Buttons". The grammar is
//!
//! ```text
//! tree  := SYMBOL ('[' (child (',' child)*)? ']')?
//! child := tree ('×' COUNT)?
//! ```
//!
//! Symbols are runs of letters, underscores and non-ASCII characters other
//! than `×` and whitespace. The canonical form separates children with `", "`,
//! omits empty brackets and omits `×1`.

mod builder;
mod parser;
mod validate;

pub use builder::{build, expand};
pub use parser::{ParseError, parse};
pub use validate::{ValidationReport, Violation, ViolationKind, validate};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Multiplicity marker.
pub const TIMES: char = '×';

/// Deepest bracket nesting [`parse`] accepts.
pub const MAX_DEPTH: usize = 64;

/// Most component instances [`expand`] produces from one tree.
pub const MAX_EXPANSION: usize = 10_000;

/// A parsed notation tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotationTree {
    /// Component symbol.
    pub symbol: String,
    /// Ordered children.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NotationChild>,
}

/// A child subtree and how many times it repeats.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotationChild {
    /// The subtree.
    pub tree: NotationTree,
    /// Repetitions, at least 1.
    pub multiplicity: u32,
}

impl NotationTree {
    /// A tree with no children.
    #[must_use]
    pub fn leaf(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            children: Vec::new(),
        }
    }

    /// Appends a child.
    #[must_use]
    pub fn with_child(mut self, tree: Self, multiplicity: u32) -> Self {
        self.children.push(NotationChild {
            tree,
            multiplicity: multiplicity.max(1),
        });
        self
    }

    /// Returns true if the tree has no children.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Symbols in preorder, each listed once regardless of multiplicity.
    #[must_use]
    pub fn symbols(&self) -> Vec<&str> {
        let mut out = vec![self.symbol.as_str()];
        for child in &self.children {
            out.extend(child.tree.symbols());
        }
        out
    }

    /// Number of component instances, counting multiplicity. Saturates at
    /// `usize::MAX`.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.children.iter().fold(1usize, |total, c| {
            total.saturating_add((c.multiplicity as usize).saturating_mul(c.tree.instance_count()))
        })
    }
}

impl fmt::Display for NotationTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.symbol)?;
        if self.children.is_empty() {
            return Ok(());
        }
        f.write_str("[")?;
        for (i, child) in self.children.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", child.tree)?;
            if child.multiplicity > 1 {
                write!(f, "{TIMES}{}", child.multiplicity)?;
            }
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_canonical() {
        let tree = NotationTree::leaf("§")
            .with_child(NotationTree::leaf("δ"), 1)
            .with_child(
                NotationTree::leaf("Ƀ").with_child(NotationTree::leaf("ᵬ"), 2),
                1,
            );
        assert_eq!(tree.to_string(), "§[δ, Ƀ[ᵬ×2]]");
        assert_eq!(tree.symbols(), vec!["§", "δ", "Ƀ", "ᵬ"]);
        assert_eq!(tree.instance_count(), 5);
    }

    #[test]
    fn test_leaf_display() {
        assert_eq!(NotationTree::leaf("ǐ").to_string(), "ǐ");
        assert!(NotationTree::leaf("ǐ").is_leaf());
    }

    #[test]
    fn test_instance_count_saturates() {
        let mut tree = NotationTree::leaf("ᵬ");
        for _ in 0..4 {
            tree = NotationTree::leaf("Ƀ").with_child(tree, u32::MAX);
        }
        assert_eq!(tree.instance_count(), usize::MAX);
    }

    #[test]
    fn test_zero_multiplicity_clamped() {
        let tree = NotationTree::leaf("Ƀ").with_child(NotationTree::leaf("ᵬ"), 0);
        assert_eq!(tree.children[0].multiplicity, 1);
    }
}
