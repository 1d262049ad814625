//! Structural validation of notation trees against the containment graph.

use serde::Serialize;
use std::fmt;

use super::NotationTree;
use crate::index::LibraryIndex;
use crate::{Error, Result};

/// What is wrong at one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationKind {
    /// The symbol names no indexed component.
    UnknownSymbol {
        /// The offending symbol.
        symbol: String,
    },
    /// The parent can never contain the child.
    NotContainable {
        /// Parent symbol.
        parent: String,
        /// Child symbol.
        child: String,
    },
}

/// One structural violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Child indices from the root to the offending node.
    pub location: Vec<usize>,
    /// The violation.
    #[serde(flatten)]
    pub kind: ViolationKind,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let at: Vec<String> = self.location.iter().map(ToString::to_string).collect();
        write!(f, "at [{}]: ", at.join("."))?;
        match &self.kind {
            ViolationKind::UnknownSymbol { symbol } => write!(f, "unknown symbol '{symbol}'"),
            ViolationKind::NotContainable { parent, child } => {
                write!(f, "'{parent}' cannot contain '{child}'")
            },
        }
    }
}

/// Every violation found in a tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// Violations in preorder.
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    /// Returns true if there are no violations.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// Converts a non-empty report into [`Error::Validation`].
    ///
    /// # Errors
    ///
    /// Returns the report itself as an error if it has violations.
    pub fn into_result(self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(Error::Validation(self))
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} structural violation(s)", self.violations.len())?;
        for (i, v) in self.violations.iter().enumerate() {
            f.write_str(if i == 0 { ": " } else { "; " })?;
            write!(f, "{v}")?;
        }
        Ok(())
    }
}

/// Checks every parent-child pair of `tree` against the graph.
///
/// Never stops at the first problem: the report lists all of them.
#[must_use]
pub fn validate(tree: &NotationTree, index: &LibraryIndex) -> ValidationReport {
    let mut report = ValidationReport::default();
    let mut location = Vec::new();
    let root = index.path_for_symbol(&tree.symbol);
    if root.is_none() {
        report.violations.push(Violation {
            location: Vec::new(),
            kind: ViolationKind::UnknownSymbol {
                symbol: tree.symbol.clone(),
            },
        });
    }
    walk(tree, root, index, &mut location, &mut report);
    report
}

fn walk(
    tree: &NotationTree,
    path: Option<&str>,
    index: &LibraryIndex,
    location: &mut Vec<usize>,
    report: &mut ValidationReport,
) {
    for (i, child) in tree.children.iter().enumerate() {
        location.push(i);
        let child_path = index.path_for_symbol(&child.tree.symbol);
        match (path, child_path) {
            (_, None) => report.violations.push(Violation {
                location: location.clone(),
                kind: ViolationKind::UnknownSymbol {
                    symbol: child.tree.symbol.clone(),
                },
            }),
            (Some(parent), Some(c)) if !index.graph().can_contain(parent, c) => {
                report.violations.push(Violation {
                    location: location.clone(),
                    kind: ViolationKind::NotContainable {
                        parent: tree.symbol.clone(),
                        child: child.tree.symbol.clone(),
                    },
                });
            },
            _ => {},
        }
        walk(&child.tree, child_path, index, location, report);
        location.pop();
    }
}
