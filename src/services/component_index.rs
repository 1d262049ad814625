//! Component points in the vector collection.
//!
//! Every symbol-bearing component of an index snapshot becomes one point:
//!
//! | Vector | Text |
//! |--------|------|
//! | `identity` | name, symbol, path |
//! | `content` | documentation and parameter signatures |
//! | `structure` | what it contains and what contains it |

use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use tracing::instrument;

use super::{MultiVectorRetriever, PointTexts};
use crate::index::LibraryIndex;
use crate::models::{Component, PointFilter, PointType};
use crate::storage::Point;
use crate::{Error, Result};

/// Point ID prefix of component points.
pub const COMPONENT_POINT_PREFIX: &str = "cmp_";

/// Outcome of syncing component points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ComponentSync {
    /// Points written.
    pub upserted: usize,
    /// Points of components no longer in the library.
    pub removed: usize,
}

/// Point ID for a component path.
#[must_use]
pub fn component_point_id(path: &str) -> String {
    format!("{COMPONENT_POINT_PREFIX}{path}")
}

/// Texts embedded for one component.
#[must_use]
pub fn component_texts(index: &LibraryIndex, component: &Component) -> PointTexts {
    let symbol = component.symbol.as_deref().unwrap_or_default();

    let mut content = component.docs.clone();
    for param in &component.params {
        if !content.is_empty() {
            content.push('\n');
        }
        content.push_str(&param.name);
        content.push_str(": ");
        content.push_str(&param.type_hint);
    }

    let graph = index.graph();
    let name_of = |path: &String| {
        index
            .component(path)
            .map_or_else(|| path.clone(), |c| c.name.clone())
    };
    let children: Vec<String> = graph.children(&component.path).iter().map(name_of).collect();
    let parents: Vec<String> = graph.parents(&component.path).iter().map(name_of).collect();
    let mut structure = format!("{} {symbol}", component.name);
    if !children.is_empty() {
        structure.push_str(" contains ");
        structure.push_str(&children.join(" "));
    }
    if !parents.is_empty() {
        structure.push_str(" inside ");
        structure.push_str(&parents.join(" "));
    }

    PointTexts {
        identity: format!("{} {symbol} {}", component.name, component.path),
        content,
        structure,
    }
}

/// Writes a point for every symbol-bearing component and removes points of
/// components that disappeared.
///
/// # Errors
///
/// Returns [`crate::Error::BoundaryUnavailable`] if embedding or the store
/// fails.
#[instrument(skip(retriever, index), fields(components = index.len()))]
pub fn sync_component_points(
    retriever: &MultiVectorRetriever,
    index: &LibraryIndex,
) -> Result<ComponentSync> {
    let mut points = Vec::new();
    for component in index.components() {
        let Some(symbol) = component.symbol.as_deref() else {
            continue;
        };
        let texts = component_texts(index, component);
        let payload = json!({
            "type": PointType::Component.as_str(),
            "name": component.name,
            "module": component.module,
            "full_path": component.path,
            "symbol": symbol,
            "docs": component.docs,
            "parent_paths": index.graph().parents(&component.path),
            "params": component.params.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
        });
        let mut point = Point::new(component_point_id(&component.path), payload);
        point.vectors = retriever.embed_point(&texts)?;
        points.push(point);
    }

    let store = retriever.store();
    store
        .upsert(&points)
        .map_err(|e| Error::boundary("vector store", e))?;

    let live: HashSet<&str> = points.iter().map(|p| p.id.as_str()).collect();
    let stale: Vec<String> = store
        .scroll(&PointFilter::new().with_type(PointType::Component))
        .map_err(|e| Error::boundary("vector store", e))?
        .into_iter()
        .map(|p| p.id)
        .filter(|id| !live.contains(id.as_str()))
        .collect();
    let removed = if stale.is_empty() {
        0
    } else {
        store
            .delete(&stale)
            .map_err(|e| Error::boundary("vector store", e))?
    };

    tracing::info!(upserted = points.len(), removed, "Synced component points");
    Ok(ComponentSync {
        upserted: points.len(),
        removed,
    })
}
