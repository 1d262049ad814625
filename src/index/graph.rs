//! Containment graph.
//!
//! A directed acyclic graph of "may contain" edges between component paths.
//! Acyclicity is enforced on every insertion: an edge whose child can already
//! reach its parent is rejected and the graph is left unchanged.

use petgraph::Direction;
use petgraph::algo::{all_simple_paths, has_path_connecting, is_cyclic_directed};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::models::{EdgeKind, RelationshipEdge};
use crate::{Error, Result};

/// Containment DAG keyed by component path.
#[derive(Debug, Clone, Default)]
pub struct RelationshipGraph {
    graph: DiGraph<String, EdgeKind>,
    nodes: HashMap<String, NodeIndex>,
}

impl RelationshipGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node if absent.
    pub fn add_node(&mut self, path: &str) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(path) {
            return idx;
        }
        let idx = self.graph.add_node(path.to_string());
        self.nodes.insert(path.to_string(), idx);
        idx
    }

    /// Adds (or re-kinds) the edge `parent -> child`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CycleDetected`] if the edge is a self-loop or `child`
    /// already reaches `parent`. The graph is unchanged on error.
    pub fn add_edge(&mut self, parent: &str, child: &str, kind: EdgeKind) -> Result<()> {
        let cycle = || Error::CycleDetected {
            parent: parent.to_string(),
            child: child.to_string(),
        };
        if parent == child {
            return Err(cycle());
        }
        if let (Some(&p), Some(&c)) = (self.nodes.get(parent), self.nodes.get(child)) {
            if has_path_connecting(&self.graph, c, p, None) {
                return Err(cycle());
            }
            if let Some(edge) = self.graph.find_edge(p, c) {
                self.graph[edge] = kind;
                return Ok(());
            }
        }

        let p = self.add_node(parent);
        let c = self.add_node(child);
        self.graph.add_edge(p, c, kind);
        Ok(())
    }

    /// Returns true if the path is a node.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.nodes.contains_key(path)
    }

    /// Returns true if `parent` may contain `child`, directly or transitively.
    #[must_use]
    pub fn can_contain(&self, parent: &str, child: &str) -> bool {
        match (self.nodes.get(parent), self.nodes.get(child)) {
            (Some(&p), Some(&c)) if p != c => has_path_connecting(&self.graph, p, c, None),
            _ => false,
        }
    }

    /// Kind of the direct edge `parent -> child`, if any.
    #[must_use]
    pub fn edge_kind(&self, parent: &str, child: &str) -> Option<EdgeKind> {
        let p = *self.nodes.get(parent)?;
        let c = *self.nodes.get(child)?;
        self.graph.find_edge(p, c).map(|e| self.graph[e])
    }

    fn neighbors(&self, idx: NodeIndex, direction: Direction) -> Vec<NodeIndex> {
        let mut out: Vec<NodeIndex> = self.graph.neighbors_directed(idx, direction).collect();
        out.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));
        out.dedup();
        out
    }

    fn names(&self, indices: &[NodeIndex]) -> Vec<String> {
        indices.iter().map(|i| self.graph[*i].clone()).collect()
    }

    /// Direct children, sorted.
    #[must_use]
    pub fn children(&self, path: &str) -> Vec<String> {
        self.nodes.get(path).map_or_else(Vec::new, |&idx| {
            self.names(&self.neighbors(idx, Direction::Outgoing))
        })
    }

    /// Direct parents, sorted.
    #[must_use]
    pub fn parents(&self, path: &str) -> Vec<String> {
        self.nodes.get(path).map_or_else(Vec::new, |&idx| {
            self.names(&self.neighbors(idx, Direction::Incoming))
        })
    }

    /// Other children of any of the node's parents, sorted.
    #[must_use]
    pub fn siblings(&self, path: &str) -> Vec<String> {
        let mut out: Vec<String> = self
            .parents(path)
            .iter()
            .flat_map(|p| self.children(p))
            .filter(|c| c != path)
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Nodes reachable from `path` within `max_depth` edges, in depth-first
    /// discovery order.
    #[must_use]
    pub fn descendants(&self, path: &str, max_depth: usize) -> Vec<String> {
        self.walk(path, max_depth, Direction::Outgoing)
    }

    /// Nodes that reach `path` within `max_depth` edges, in depth-first
    /// discovery order.
    #[must_use]
    pub fn ancestors(&self, path: &str, max_depth: usize) -> Vec<String> {
        self.walk(path, max_depth, Direction::Incoming)
    }

    fn walk(&self, path: &str, max_depth: usize, direction: Direction) -> Vec<String> {
        let Some(&start) = self.nodes.get(path) else {
            return Vec::new();
        };

        // A node is re-expanded when reached at a shallower depth, so the cap
        // never hides nodes that a shorter route would reach.
        let mut best: HashMap<NodeIndex, usize> = HashMap::from([(start, 0)]);
        let mut emitted: HashSet<NodeIndex> = HashSet::new();
        let mut order = Vec::new();
        let mut stack = vec![(start, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            if best.get(&node).is_some_and(|&d| d < depth) {
                continue;
            }
            if node != start && emitted.insert(node) {
                order.push(node);
            }
            if depth >= max_depth {
                continue;
            }
            for next in self.neighbors(node, direction).into_iter().rev() {
                let next_depth = depth + 1;
                if best.get(&next).is_some_and(|&d| d <= next_depth) {
                    continue;
                }
                best.insert(next, next_depth);
                stack.push((next, next_depth));
            }
        }
        self.names(&order)
    }

    /// Every simple path from `source` to `target`, sorted.
    #[must_use]
    pub fn all_paths(&self, source: &str, target: &str) -> Vec<Vec<String>> {
        let (Some(&s), Some(&t)) = (self.nodes.get(source), self.nodes.get(target)) else {
            return Vec::new();
        };
        if s == t {
            return Vec::new();
        }
        let mut paths: Vec<Vec<String>> = all_simple_paths::<Vec<_>, _>(&self.graph, s, t, 0, None)
            .map(|p: Vec<NodeIndex>| self.names(&p))
            .collect();
        paths.sort();
        paths
    }

    /// Fewest-edge path from `source` to `target`, inclusive of both ends.
    ///
    /// Ties go to the lexicographically smallest route.
    #[must_use]
    pub fn shortest_path(&self, source: &str, target: &str) -> Option<Vec<String>> {
        let s = *self.nodes.get(source)?;
        let t = *self.nodes.get(target)?;
        if s == t {
            return Some(vec![source.to_string()]);
        }

        let mut previous: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::from([s]);
        while let Some(node) = queue.pop_front() {
            for next in self.neighbors(node, Direction::Outgoing) {
                if next == s || previous.contains_key(&next) {
                    continue;
                }
                previous.insert(next, node);
                if next == t {
                    let mut route = vec![t];
                    let mut cur = t;
                    while let Some(&p) = previous.get(&cur) {
                        route.push(p);
                        cur = p;
                    }
                    route.reverse();
                    return Some(self.names(&route));
                }
                queue.push_back(next);
            }
        }
        None
    }

    /// All edges, sorted.
    #[must_use]
    pub fn edges(&self) -> Vec<RelationshipEdge> {
        let mut edges: Vec<RelationshipEdge> = self
            .graph
            .edge_references()
            .map(|e| RelationshipEdge {
                parent: self.graph[e.source()].clone(),
                child: self.graph[e.target()].clone(),
                kind: *e.weight(),
            })
            .collect();
        edges.sort();
        edges
    }

    /// Returns true if the graph has no cycle.
    #[must_use]
    pub fn is_acyclic(&self) -> bool {
        !is_cyclic_directed(&self.graph)
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}
