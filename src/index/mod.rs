//! Library indexing.
//!
//! An indexing pass turns the library's component descriptors into an
//! immutable [`LibraryIndex`]: components keyed by path, a [`SymbolTable`]
//! and a containment [`RelationshipGraph`]. The index is published through an
//! [`IndexHandle`]; readers hold an `Arc` snapshot and never observe a
//! half-built index.

mod graph;
mod hints;
mod symbols;

pub use graph::RelationshipGraph;
pub use hints::referenced_types;
pub use symbols::{RESERVED, SymbolTable};

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tracing::instrument;

use crate::models::{
    Component, ComponentDescriptor, ComponentKind, EdgeOverride, RelationshipEdge,
};
use crate::{Error, Result};

/// Immutable result of one indexing pass.
#[derive(Debug, Clone, Default)]
pub struct LibraryIndex {
    components: BTreeMap<String, Component>,
    by_name: BTreeMap<String, Vec<String>>,
    symbols: SymbolTable,
    graph: RelationshipGraph,
    fingerprint: String,
}

impl LibraryIndex {
    /// An index with no components.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Component by path.
    #[must_use]
    pub fn component(&self, path: &str) -> Option<&Component> {
        self.components.get(path)
    }

    /// All components in path order.
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.values()
    }

    /// Number of components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Returns true if the index has no components.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// The symbol table.
    #[must_use]
    pub const fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// The containment graph.
    #[must_use]
    pub const fn graph(&self) -> &RelationshipGraph {
        &self.graph
    }

    /// SHA-256 over the sorted descriptors and overrides.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Symbol for a component path.
    #[must_use]
    pub fn symbol_for(&self, path: &str) -> Option<&str> {
        self.symbols.symbol_for(path)
    }

    /// Component path for a symbol.
    #[must_use]
    pub fn path_for_symbol(&self, symbol: &str) -> Option<&str> {
        self.symbols.path_for(symbol)
    }

    /// Paths of every component with the given display name.
    #[must_use]
    pub fn paths_for_name(&self, name: &str) -> &[String] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Resolves a path, a unique display name or a symbol to a component path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ComponentNotFound`] if nothing matches and
    /// [`Error::InvalidInput`] if a display name is ambiguous.
    pub fn resolve_name(&self, name: &str) -> Result<String> {
        if self.components.contains_key(name) {
            return Ok(name.to_string());
        }
        match self.paths_for_name(name) {
            [path] => return Ok(path.clone()),
            [] => {},
            many => {
                return Err(Error::InvalidInput(format!(
                    "ambiguous component name '{name}': {}",
                    many.join(", ")
                )));
            },
        }
        self.path_for_symbol(name)
            .map(String::from)
            .ok_or_else(|| Error::ComponentNotFound(name.to_string()))
    }

    /// Distributes parameter names over components.
    ///
    /// Each parameter goes to the first component (in order) that declares
    /// it; undeclared parameters go to the first component.
    #[must_use]
    pub fn assign_params(
        &self,
        components: &[String],
        params: &BTreeMap<String, Value>,
    ) -> Vec<Vec<String>> {
        let mut assignment = vec![Vec::new(); components.len()];
        if components.is_empty() {
            return assignment;
        }
        for name in params.keys() {
            let owner = components
                .iter()
                .position(|path| self.component(path).is_some_and(|c| c.declares(name)))
                .unwrap_or(0);
            assignment[owner].push(name.clone());
        }
        assignment
    }
}

/// Summary of an indexing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    /// Components indexed.
    pub components: usize,
    /// Symbols assigned.
    pub symbols: usize,
    /// Edges in the graph.
    pub edges: usize,
    /// Hint-derived edges dropped because they would close a cycle.
    pub rejected_edges: Vec<RelationshipEdge>,
    /// Type-hint names that matched no class (or more than one).
    pub unresolved_hints: Vec<String>,
    /// Library fingerprint.
    pub fingerprint: String,
}

/// Builds a [`LibraryIndex`] from descriptors.
#[derive(Debug, Default, Clone, Copy)]
pub struct Indexer;

impl Indexer {
    /// Runs one indexing pass.
    ///
    /// Hint-derived edges that would close a cycle are dropped and reported;
    /// an override that would close a cycle fails the whole pass.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SymbolExhausted`], [`Error::CycleDetected`] (from an
    /// override), or [`Error::InvalidInput`] for duplicate paths and
    /// overrides naming unknown components.
    #[instrument(skip_all, fields(descriptors = descriptors.len(), overrides = overrides.len()))]
    pub fn build(
        descriptors: &[ComponentDescriptor],
        overrides: &[EdgeOverride],
    ) -> Result<(LibraryIndex, IndexReport)> {
        let start = Instant::now();
        let result = Self::build_inner(descriptors, overrides);

        let status = if result.is_ok() { "success" } else { "error" };
        metrics::counter!("cardsmith_index_builds_total", "status" => status).increment(1);
        metrics::histogram!("cardsmith_index_build_duration_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);

        if let Ok((_, report)) = &result {
            tracing::info!(
                components = report.components,
                symbols = report.symbols,
                edges = report.edges,
                rejected = report.rejected_edges.len(),
                "Indexed component library"
            );
        }
        result
    }

    fn build_inner(
        descriptors: &[ComponentDescriptor],
        overrides: &[EdgeOverride],
    ) -> Result<(LibraryIndex, IndexReport)> {
        let mut sorted: Vec<&ComponentDescriptor> = descriptors.iter().collect();
        sorted.sort_by_key(|d| d.path());

        let mut index = LibraryIndex::empty();
        for descriptor in &sorted {
            let component = Component::from_descriptor(descriptor);
            if index.components.contains_key(&component.path) {
                return Err(Error::InvalidInput(format!(
                    "duplicate component path: {}",
                    component.path
                )));
            }
            index
                .by_name
                .entry(component.name.clone())
                .or_default()
                .push(component.path.clone());
            index.components.insert(component.path.clone(), component);
        }

        let class_paths: Vec<String> = index
            .components
            .values()
            .filter(|c| c.kind == ComponentKind::Class)
            .map(|c| c.path.clone())
            .collect();

        for path in &class_paths {
            let Some(component) = index.components.get_mut(path) else {
                continue;
            };
            component.symbol = Some(index.symbols.assign(component)?);
            index.graph.add_node(path);
        }

        let mut report = IndexReport::default();
        for path in &class_paths {
            let Some(component) = index.components.get(path) else {
                continue;
            };
            let mut derived = Vec::new();
            for param in &component.params {
                for (name, kind) in referenced_types(&param.type_hint) {
                    match index.resolve_hint(&component.module, &name) {
                        Some(child) => derived.push(RelationshipEdge {
                            parent: path.clone(),
                            child,
                            kind,
                        }),
                        None => report.unresolved_hints.push(format!("{path}: {name}")),
                    }
                }
            }
            for edge in derived {
                if let Err(Error::CycleDetected { .. }) =
                    index.graph.add_edge(&edge.parent, &edge.child, edge.kind)
                {
                    tracing::warn!(
                        parent = %edge.parent,
                        child = %edge.child,
                        "Dropping type-hint edge that would close a cycle"
                    );
                    report.rejected_edges.push(edge);
                }
            }
        }

        for edge in overrides {
            let parent = index.resolve_name(&edge.parent).map_err(|_| {
                Error::InvalidInput(format!("override names unknown component '{}'", edge.parent))
            })?;
            let child = index.resolve_name(&edge.child).map_err(|_| {
                Error::InvalidInput(format!("override names unknown component '{}'", edge.child))
            })?;
            index.graph.add_edge(&parent, &child, edge.kind)?;
        }

        index.fingerprint = fingerprint(&sorted, overrides)?;

        report.components = index.components.len();
        report.symbols = index.symbols.len();
        report.edges = index.graph.edge_count();
        report.fingerprint.clone_from(&index.fingerprint);
        Ok((index, report))
    }
}

impl LibraryIndex {
    /// Resolves a type-hint name to a class path: exact path, then the same
    /// module, then a unique class name.
    fn resolve_hint(&self, module: &str, name: &str) -> Option<String> {
        let is_class =
            |path: &str| self.component(path).is_some_and(|c| c.kind == ComponentKind::Class);

        if is_class(name) {
            return Some(name.to_string());
        }
        let short = name.rsplit('.').next().unwrap_or(name);
        let local = if module.is_empty() {
            short.to_string()
        } else {
            format!("{module}.{short}")
        };
        if is_class(&local) {
            return Some(local);
        }
        let candidates: Vec<&String> = self
            .paths_for_name(short)
            .iter()
            .filter(|p| is_class(p))
            .collect();
        match candidates.as_slice() {
            [only] => Some((*only).clone()),
            _ => None,
        }
    }
}

/// SHA-256 over the path-sorted descriptors and the overrides.
///
/// Independent of descriptor order; two libraries with equal fingerprints
/// index identically.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if a descriptor cannot be serialized.
pub fn library_fingerprint(
    descriptors: &[ComponentDescriptor],
    overrides: &[EdgeOverride],
) -> Result<String> {
    let mut sorted: Vec<&ComponentDescriptor> = descriptors.iter().collect();
    sorted.sort_by_key(|d| d.path());
    fingerprint(&sorted, overrides)
}

fn fingerprint(descriptors: &[&ComponentDescriptor], overrides: &[EdgeOverride]) -> Result<String> {
    let mut hasher = Sha256::new();
    for descriptor in descriptors {
        let bytes = serde_json::to_vec(descriptor)
            .map_err(|e| Error::operation("fingerprint_library", e))?;
        hasher.update(&bytes);
        hasher.update(b"\n");
    }
    for edge in overrides {
        let bytes =
            serde_json::to_vec(edge).map_err(|e| Error::operation("fingerprint_library", e))?;
        hasher.update(&bytes);
        hasher.update(b"\n");
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Atomically swappable pointer to the current index.
#[derive(Debug, Default)]
pub struct IndexHandle {
    current: RwLock<Arc<LibraryIndex>>,
}

impl IndexHandle {
    /// Creates a handle publishing `index`.
    #[must_use]
    pub fn new(index: LibraryIndex) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
        }
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn load(&self) -> Arc<LibraryIndex> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replaces the snapshot. Readers holding the old one keep it.
    pub fn publish(&self, index: LibraryIndex) {
        let next = Arc::new(index);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EdgeKind, ParamSpec};
    use serde_json::json;

    fn card_library() -> Vec<ComponentDescriptor> {
        vec![
            ComponentDescriptor::class("card", "Card")
                .with_param(ParamSpec::new("sections", "List[Section]")),
            ComponentDescriptor::class("card", "Section")
                .with_param(ParamSpec::new("header", "Optional[str]"))
                .with_param(ParamSpec::new(
                    "widgets",
                    "List[Union[DecoratedText, ButtonList, Image]]",
                )),
            ComponentDescriptor::class("card", "DecoratedText")
                .with_param(ParamSpec::new("text", "str"))
                .with_param(ParamSpec::new("button", "Optional[Button]")),
            ComponentDescriptor::class("card", "ButtonList")
                .with_param(ParamSpec::new("buttons", "List[Button]")),
            ComponentDescriptor::class("card", "Button")
                .with_param(ParamSpec::new("text", "str"))
                .with_param(ParamSpec::new("url", "str")),
            ComponentDescriptor::class("card", "Image")
                .with_param(ParamSpec::new("image_url", "str")),
        ]
    }

    #[test]
    fn test_build_assigns_symbols_and_edges() {
        let (index, report) = Indexer::build(&card_library(), &[]).unwrap();
        assert_eq!(report.components, 6);
        assert_eq!(report.symbols, 6);
        assert_eq!(index.symbol_for("card.Section"), Some("§"));
        assert_eq!(index.path_for_symbol("δ"), Some("card.DecoratedText"));
        assert_eq!(
            index.graph().edge_kind("card.Section", "card.DecoratedText"),
            Some(EdgeKind::Repeated)
        );
        assert_eq!(
            index.graph().edge_kind("card.DecoratedText", "card.Button"),
            Some(EdgeKind::Optional)
        );
        assert!(index.graph().can_contain("card.Card", "card.Button"));
        assert!(report.rejected_edges.is_empty());
    }

    #[test]
    fn test_hint_cycle_is_rejected_and_reported() {
        let mut library = card_library();
        library.push(
            ComponentDescriptor::class("card", "Wrapper")
                .with_param(ParamSpec::new("child", "Wrapper")),
        );
        let (index, report) = Indexer::build(&library, &[]).unwrap();
        assert_eq!(report.rejected_edges.len(), 1);
        assert_eq!(report.rejected_edges[0].parent, "card.Wrapper");
        assert!(index.graph().is_acyclic());
    }

    #[test]
    fn test_override_cycle_is_fatal() {
        let overrides = vec![EdgeOverride {
            parent: "Button".to_string(),
            child: "Card".to_string(),
            kind: EdgeKind::Direct,
        }];
        let err = Indexer::build(&card_library(), &overrides).unwrap_err();
        assert!(matches!(err, Error::CycleDetected { .. }));
    }

    #[test]
    fn test_override_with_unknown_component() {
        let overrides = vec![EdgeOverride {
            parent: "Section".to_string(),
            child: "Carousel".to_string(),
            kind: EdgeKind::Optional,
        }];
        assert!(matches!(
            Indexer::build(&card_library(), &overrides),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_fingerprint_is_order_independent() {
        let mut reversed = card_library();
        reversed.reverse();
        let (a, _) = Indexer::build(&card_library(), &[]).unwrap();
        let (b, _) = Indexer::build(&reversed, &[]).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);

        let mut changed = card_library();
        changed.pop();
        let (c, _) = Indexer::build(&changed, &[]).unwrap();
        assert_ne!(a.fingerprint(), c.fingerprint());

        assert_eq!(library_fingerprint(&reversed, &[]).unwrap(), a.fingerprint());
    }

    #[test]
    fn test_resolve_name() {
        let (index, _) = Indexer::build(&card_library(), &[]).unwrap();
        assert_eq!(index.resolve_name("card.Image").unwrap(), "card.Image");
        assert_eq!(index.resolve_name("Image").unwrap(), "card.Image");
        assert_eq!(index.resolve_name("ᵬ").unwrap(), "card.Button");
        assert!(matches!(
            index.resolve_name("Carousel"),
            Err(Error::ComponentNotFound(_))
        ));
    }

    #[test]
    fn test_ambiguous_name() {
        let mut library = card_library();
        library.push(ComponentDescriptor::class("card.v2", "Image"));
        let (index, _) = Indexer::build(&library, &[]).unwrap();
        assert!(matches!(
            index.resolve_name("Image"),
            Err(Error::InvalidInput(_))
        ));
        // Same-module hint resolution still picks card.Image for Section.
        assert!(
            index
                .graph()
                .edge_kind("card.Section", "card.Image")
                .is_some()
        );
    }

    #[test]
    fn test_duplicate_paths_rejected() {
        let mut library = card_library();
        library.push(ComponentDescriptor::class("card", "Image"));
        assert!(Indexer::build(&library, &[]).is_err());
    }

    #[test]
    fn test_assign_params() {
        let (index, _) = Indexer::build(&card_library(), &[]).unwrap();
        let components = vec![
            "card.Section".to_string(),
            "card.DecoratedText".to_string(),
            "card.Button".to_string(),
        ];
        let params = BTreeMap::from([
            ("header".to_string(), json!("Status")),
            ("text".to_string(), json!("All green")),
            ("url".to_string(), json!("https://example.com")),
            ("theme".to_string(), json!("dark")),
        ]);
        let assignment = index.assign_params(&components, &params);
        assert_eq!(assignment[0], vec!["header", "theme"]);
        assert_eq!(assignment[1], vec!["text"]);
        assert_eq!(assignment[2], vec!["url"]);
    }

    #[test]
    fn test_handle_swaps_atomically() {
        let handle = IndexHandle::new(LibraryIndex::empty());
        let before = handle.load();
        let (index, _) = Indexer::build(&card_library(), &[]).unwrap();
        handle.publish(index);
        assert!(before.is_empty());
        assert_eq!(handle.load().len(), 6);
    }
}
