//! Storage backend traits.

mod resolution;
mod templates;
mod vector;

pub use resolution::ResolutionStore;
pub use templates::TemplateArtifactStore;
pub use vector::{Point, ScoredPoint, VectorData, VectorStore};
