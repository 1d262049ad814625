//! Embedding generation.
//!
//! The embedding models are an external boundary. Two representations are
//! produced:
//!
//! | Strategy | Shape | Used for |
//! |----------|-------|----------|
//! | [`EmbeddingStrategy::MultiVector`] | one vector per token | identity (late interaction) |
//! | [`EmbeddingStrategy::Dense`] | one vector | content, structure |
//!
//! [`HashEmbedder`] is a deterministic, model-free implementation used by the
//! CLI and the test-suite.

// Allow cast precision loss for hash-based embedding calculations.
#![allow(clippy::cast_precision_loss)]
// Allow cast possible truncation for hash index calculations on 32-bit platforms.
#![allow(clippy::cast_possible_truncation)]

mod hashing;

pub use hashing::{HashEmbedder, tokenize};

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::storage::VectorData;

/// Which representation a named vector field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingStrategy {
    /// Single dense vector.
    Dense,
    /// Token-level multi-vector.
    MultiVector,
}

/// Trait for embedding generators.
pub trait Embedder: Send + Sync {
    /// Returns the embedding dimensions.
    fn dimensions(&self) -> usize;

    /// Generates a single dense embedding.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails.
    fn embed_dense(&self, text: &str) -> Result<Vec<f32>>;

    /// Generates one embedding per token.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails.
    fn embed_multivector(&self, text: &str) -> Result<Vec<Vec<f32>>>;

    /// Generates the representation for `strategy`.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails.
    fn embed(&self, text: &str, strategy: EmbeddingStrategy) -> Result<VectorData> {
        match strategy {
            EmbeddingStrategy::Dense => self.embed_dense(text).map(VectorData::Dense),
            EmbeddingStrategy::MultiVector => self.embed_multivector(text).map(VectorData::Multi),
        }
    }
}
