//! Storage layer abstraction.
//!
//! Three storage concerns sit behind traits so callers can inject their own
//! clients:
//! - **Vector**: named-vector point collection (components, patterns, templates)
//! - **Resolution**: on-disk tier of the resolution cache (`SQLite`)
//! - **Templates**: durable template artifacts (filesystem)

// Allow cast precision loss for similarity calculations.
#![allow(clippy::cast_precision_loss)]
// Allow significant_drop_tightening - dropping connections slightly early
// provides no meaningful benefit.
#![allow(clippy::significant_drop_tightening)]

pub mod resolution;
pub mod sqlite;
pub mod templates;
pub mod traits;
pub mod vector;

pub use resolution::SqliteResolutionStore;
pub use templates::FilesystemTemplateStore;
pub use traits::{
    Point, ResolutionStore, ScoredPoint, TemplateArtifactStore, VectorData, VectorStore,
};
pub use vector::InMemoryVectorStore;
