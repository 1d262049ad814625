//! # Cardsmith
//!
//! Semantic component discovery and pattern promotion for card UI libraries.
//!
//! Cardsmith introspects a component library, gives every component class a
//! compact notation symbol, records which components may contain which, and
//! serves card builds from that knowledge. Successful builds are written back
//! as usage patterns; patterns that keep receiving positive feedback are
//! promoted into reusable templates.
//!
//! ## Features
//!
//! - Reproducible symbol assignment with per-module fallback pools
//! - Containment DAG with cycle rejection on every insertion
//! - Compact notation (`§[δ, Ƀ[ᵬ×2]]`) with parse, validate and build
//! - Multi-vector retrieval merged with Reciprocal Rank Fusion
//! - Three-tier resolution cache (LRU, `SQLite`, library) with single-flight
//! - Feedback-driven promotion of usage patterns into durable templates
//!
//! ## Example
//!
//! ```rust,ignore
//! use cardsmith::dsl;
//!
//! let tree = dsl::parse("§[δ, Ƀ[ᵬ×2]]")?;
//! assert_eq!(tree.symbol, "§");
//! assert_eq!(tree.to_string(), "§[δ, Ƀ[ᵬ×2]]");
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod config;
pub mod dsl;
pub mod embedding;
pub mod index;
pub mod library;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

pub use config::CardsmithConfig;
pub use dsl::{NotationTree, ParseError, ValidationReport};
pub use embedding::{Embedder, EmbeddingStrategy};
pub use index::{IndexHandle, IndexReport, Indexer, LibraryIndex};
pub use library::{ComponentLibrary, ComponentRegistry};
pub use models::{
    Component, ComponentKind, EdgeKind, Feedback, InstancePattern, PatternId, PointFilter,
    PointType, PromotionState, ResolvedComponent, Template,
};
pub use services::{
    BuildPlan, BuildRequest, ComponentEngine, MultiVectorRetriever, PatternStore,
    PromotionMachine, RrfFusion, TieredCache, VariationGenerator,
};
pub use storage::{ResolutionStore, TemplateArtifactStore, VectorStore};

/// Error type for cardsmith operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When | Recoverable |
/// |---------|-------------|-------------|
/// | `InvalidInput` | Malformed arguments, ambiguous names | yes |
/// | `OperationFailed` | I/O, `SQLite` or serialization failures | depends |
/// | `SymbolExhausted` | Both symbol pools are used up | no (indexing) |
/// | `CycleDetected` | An edge would close a containment cycle | no (indexing) |
/// | `Parse` | Notation does not follow the grammar | yes |
/// | `Validation` | Notation names impossible containment | yes |
/// | `ComponentNotFound` | Path unknown to the library | yes |
/// | `NotFound` | Feedback for an unknown pattern id | yes |
/// | `BoundaryUnavailable` | Vector store or embedder failed | transient |
#[derive(Debug, Clone, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// No symbol is left for a component in either pool.
    #[error("symbol pools exhausted for {module}.{name}")]
    SymbolExhausted {
        /// Module of the component.
        module: String,
        /// Class name of the component.
        name: String,
    },

    /// Adding the edge would make the containment graph cyclic.
    #[error("edge {parent} -> {child} would create a containment cycle")]
    CycleDetected {
        /// Container path.
        parent: String,
        /// Containee path.
        child: String,
    },

    /// Notation could not be parsed.
    #[error(transparent)]
    Parse(#[from] dsl::ParseError),

    /// Notation parsed but describes containment the graph does not allow.
    #[error("{0}")]
    Validation(dsl::ValidationReport),

    /// The component path is not known to the library.
    #[error("component not found: {0}")]
    ComponentNotFound(String),

    /// The referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An external boundary (vector store, embedder) failed.
    #[error("{boundary} unavailable: {cause}")]
    BoundaryUnavailable {
        /// Which boundary failed.
        boundary: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Shorthand for [`Error::OperationFailed`].
    pub fn operation(operation: impl Into<String>, cause: impl ToString) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            cause: cause.to_string(),
        }
    }

    /// Shorthand for [`Error::BoundaryUnavailable`].
    pub fn boundary(boundary: impl Into<String>, cause: impl ToString) -> Self {
        Self::BoundaryUnavailable {
            boundary: boundary.into(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for cardsmith operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Falls back to 0 if the system clock is before the Unix epoch.
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
