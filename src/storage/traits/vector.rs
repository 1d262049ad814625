//! Vector store trait.
//!
//! The vector store is an external collaborator: a collection of points,
//! each carrying one or more named vectors and a JSON payload.
//!
//! # Named Vectors
//!
//! | Name | Shape | Used for |
//! |------|-------|----------|
//! | `identity` | multi-vector | names, symbols, descriptions |
//! | `content` | dense | documentation, parameter values |
//! | `structure` | dense | containment neighbourhood, notation |
//!
//! # Payload Fields
//!
//! `type`, `name`, `full_path`, `parent_paths`, `components`, `params`,
//! `feedback`, timestamps. See [`crate::models::PointFilter`] for the fields
//! filters read.
//!
//! # Usage Example
//!
//! ```rust,ignore
//! use cardsmith::storage::{InMemoryVectorStore, Point, VectorData, VectorStore};
//! use cardsmith::models::PointFilter;
//!
//! let store = InMemoryVectorStore::new();
//! store.upsert(&[Point::new("p1", payload).with_vector("content", VectorData::Dense(v))])?;
//! let hits = store.query("content", &VectorData::Dense(q), &PointFilter::new(), 10)?;
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::Result;
use crate::models::PointFilter;

/// A vector value: one dense vector or a token-level multi-vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorData {
    /// Single dense vector.
    Dense(Vec<f32>),
    /// One vector per token (late interaction).
    Multi(Vec<Vec<f32>>),
}

impl VectorData {
    /// Returns the shape name.
    #[must_use]
    pub const fn shape(&self) -> &'static str {
        match self {
            Self::Dense(_) => "dense",
            Self::Multi(_) => "multi",
        }
    }
}

/// A stored point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Point ID.
    pub id: String,
    /// Named vectors.
    pub vectors: BTreeMap<String, VectorData>,
    /// JSON payload.
    pub payload: Value,
}

impl Point {
    /// Creates a point without vectors.
    #[must_use]
    pub fn new(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            vectors: BTreeMap::new(),
            payload,
        }
    }

    /// Adds a named vector.
    #[must_use]
    pub fn with_vector(mut self, name: impl Into<String>, vector: VectorData) -> Self {
        self.vectors.insert(name.into(), vector);
        self
    }
}

/// A ranked query result.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    /// Point ID.
    pub id: String,
    /// Similarity score (higher is closer).
    pub score: f32,
    /// Payload of the point.
    pub payload: Value,
}

/// Trait for vector store clients.
///
/// Implementations should be thread-safe (`Send + Sync`); methods take `&self`
/// so a client can be shared as `Arc<dyn VectorStore>` across concurrent
/// requests.
///
/// # Errors
///
/// Failures are infrastructure errors and must be reported, never turned into
/// empty results: fusion ranks depend on every constituent list.
pub trait VectorStore: Send + Sync {
    /// Inserts or replaces points by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn upsert(&self, points: &[Point]) -> Result<()>;

    /// Searches one named vector.
    ///
    /// Only points that carry `vector_name` and whose payload passes `filter`
    /// are considered. Results are ordered by descending score.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the query shape does not match
    /// the stored field.
    fn query(
        &self,
        vector_name: &str,
        query: &VectorData,
        filter: &PointFilter,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>>;

    /// Returns every point whose payload passes `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan fails.
    fn scroll(&self, filter: &PointFilter) -> Result<Vec<Point>>;

    /// Fetches one point by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn get(&self, id: &str) -> Result<Option<Point>>;

    /// Deletes points by ID, returning how many existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn delete(&self, ids: &[String]) -> Result<usize>;

    /// Returns the number of stored points.
    ///
    /// # Errors
    ///
    /// Returns an error if the count fails.
    fn count(&self) -> Result<usize>;
}
