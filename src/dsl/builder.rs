//! Notation from flat component lists, and back.

use super::{
    MAX_EXPANSION, NotationChild, NotationTree, ValidationReport, Violation, ViolationKind,
};
use crate::index::LibraryIndex;
use crate::{Error, Result};

struct Node {
    path: String,
    symbol: String,
    children: Vec<usize>,
}

/// Builds canonical notation from a flat list of components.
///
/// Items may be paths, unique display names or symbols. The first item is
/// the root. Every later item is nested under the already placed component
/// with the shortest containment path to it; ties go to the most recently
/// placed. Consecutive identical siblings collapse into `×N`.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for an empty list or a non-class item,
/// [`Error::ComponentNotFound`] for an unknown item, and
/// [`Error::Validation`] listing every item no placed component can contain.
pub fn build<S: AsRef<str>>(index: &LibraryIndex, items: &[S]) -> Result<NotationTree> {
    if items.is_empty() {
        return Err(Error::InvalidInput(
            "cannot build notation from an empty component list".to_string(),
        ));
    }

    let mut nodes: Vec<Node> = Vec::with_capacity(items.len());
    let mut report = ValidationReport::default();

    for (i, item) in items.iter().enumerate() {
        let path = index.resolve_name(item.as_ref())?;
        let symbol = index
            .symbol_for(&path)
            .ok_or_else(|| Error::InvalidInput(format!("{path} has no notation symbol")))?
            .to_string();

        if nodes.is_empty() {
            nodes.push(Node {
                path,
                symbol,
                children: Vec::new(),
            });
            continue;
        }

        let parent = nodes
            .iter()
            .enumerate()
            .filter_map(|(idx, node)| {
                index
                    .graph()
                    .shortest_path(&node.path, &path)
                    .filter(|route| route.len() > 1)
                    .map(|route| (route.len(), idx))
            })
            .min_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))
            .map(|(_, idx)| idx);

        match parent {
            Some(parent) => {
                nodes.push(Node {
                    path,
                    symbol,
                    children: Vec::new(),
                });
                let child = nodes.len() - 1;
                nodes[parent].children.push(child);
            },
            None => report.violations.push(Violation {
                location: vec![i],
                kind: ViolationKind::NotContainable {
                    parent: nodes[0].symbol.clone(),
                    child: symbol,
                },
            }),
        }
    }

    report.into_result()?;
    Ok(to_tree(&nodes, 0))
}

fn to_tree(nodes: &[Node], idx: usize) -> NotationTree {
    let mut children: Vec<NotationChild> = Vec::new();
    for &child in &nodes[idx].children {
        let tree = to_tree(nodes, child);
        match children.last_mut() {
            Some(last) if last.tree == tree => last.multiplicity += 1,
            _ => children.push(NotationChild {
                tree,
                multiplicity: 1,
            }),
        }
    }
    NotationTree {
        symbol: nodes[idx].symbol.clone(),
        children,
    }
}

/// Expands a tree into component paths in preorder, repeating each subtree
/// by its multiplicity.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the tree stands for more than
/// [`MAX_EXPANSION`] instances, and [`Error::Validation`] listing every
/// unknown symbol.
pub fn expand(tree: &NotationTree, index: &LibraryIndex) -> Result<Vec<String>> {
    let count = tree.instance_count();
    if count > MAX_EXPANSION {
        return Err(Error::InvalidInput(format!(
            "notation expands to {count} components, more than {MAX_EXPANSION}"
        )));
    }
    let mut out = Vec::with_capacity(count);
    let mut report = ValidationReport::default();
    let mut location = Vec::new();
    expand_into(tree, index, &mut location, &mut out, &mut report);
    report.into_result()?;
    Ok(out)
}

fn expand_into(
    tree: &NotationTree,
    index: &LibraryIndex,
    location: &mut Vec<usize>,
    out: &mut Vec<String>,
    report: &mut ValidationReport,
) {
    match index.path_for_symbol(&tree.symbol) {
        Some(path) => out.push(path.to_string()),
        None => report.violations.push(Violation {
            location: location.clone(),
            kind: ViolationKind::UnknownSymbol {
                symbol: tree.symbol.clone(),
            },
        }),
    }
    for (i, child) in tree.children.iter().enumerate() {
        location.push(i);
        for _ in 0..child.multiplicity {
            expand_into(&child.tree, index, location, out, report);
            if !report.is_valid() {
                break;
            }
        }
        location.pop();
    }
}
