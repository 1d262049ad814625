//! Hash-based pseudo-embeddings.
//!
//! Each token contributes its own hash plus the hashes of its character
//! trigrams, so `button` and `buttons` land close together. Deterministic for
//! a given build; not semantically meaningful beyond lexical overlap.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::Embedder;
use crate::models::split_identifier;
use crate::{Error, Result};

/// Default embedding dimensions.
pub const DEFAULT_DIMENSIONS: usize = 128;

/// Maximum tokens considered per text.
const MAX_TOKENS: usize = 128;

/// Deterministic hash embedder.
#[derive(Debug, Clone, Copy)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    /// Creates an embedder with [`DEFAULT_DIMENSIONS`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            dimensions: DEFAULT_DIMENSIONS,
        }
    }

    /// Creates an embedder with custom dimensions (minimum 8).
    #[must_use]
    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(8),
        }
    }

    fn token_vector(&self, token: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];
        Self::distribute_hash(&mut embedding, hash_str(token), 1.0);

        let chars: Vec<char> = format!("^{token}$").chars().collect();
        for window in chars.windows(3) {
            let trigram: String = window.iter().collect();
            Self::distribute_hash(&mut embedding, hash_str(&trigram), 0.5);
        }

        normalize(&mut embedding);
        embedding
    }

    /// Distributes a hash value across embedding dimensions.
    fn distribute_hash(embedding: &mut [f32], hash: u64, weight: f32) {
        let dimensions = embedding.len();
        for j in 0..8 {
            let idx = ((hash >> (j * 8)) as usize) % dimensions;
            let value = ((hash >> (j * 4)) & 0xFF) as f32 / 255.0 - 0.5;
            embedding[idx] += value * weight;
        }
    }

    fn tokens_or_error(text: &str) -> Result<Vec<String>> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Err(Error::InvalidInput("cannot embed empty text".to_string()));
        }
        Ok(tokens)
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl Embedder for HashEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_dense(&self, text: &str) -> Result<Vec<f32>> {
        let tokens = Self::tokens_or_error(text)?;
        let mut embedding = vec![0.0f32; self.dimensions];
        for token in &tokens {
            for (acc, v) in embedding.iter_mut().zip(self.token_vector(token)) {
                *acc += v;
            }
        }
        normalize(&mut embedding);
        Ok(embedding)
    }

    fn embed_multivector(&self, text: &str) -> Result<Vec<Vec<f32>>> {
        let tokens = Self::tokens_or_error(text)?;
        Ok(tokens.iter().map(|t| self.token_vector(t)).collect())
    }
}

/// Splits text into lowercase tokens.
///
/// Identifiers are split on case and punctuation boundaries; chunks with no
/// alphanumerics (notation symbols such as `§`) are kept whole.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for chunk in text.split_whitespace() {
        let words = split_identifier(chunk);
        if words.is_empty() {
            let symbol: String = chunk
                .chars()
                .filter(|c| !matches!(c, '[' | ']' | ',' | '(' | ')' | ':' | '.'))
                .collect();
            if !symbol.is_empty() {
                tokens.push(symbol);
            }
        } else {
            tokens.extend(words);
        }
        if tokens.len() >= MAX_TOKENS {
            tokens.truncate(MAX_TOKENS);
            break;
        }
    }
    tokens
}

fn hash_str(s: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

/// Normalizes an embedding vector in-place.
fn normalize(embedding: &mut [f32]) {
    let norm_sq: f32 = embedding.iter().map(|x| x * x).sum();
    if norm_sq <= 0.0 {
        return;
    }
    let inv_norm = norm_sq.sqrt().recip();
    for v in embedding.iter_mut() {
        *v *= inv_norm;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingStrategy;
    use crate::storage::vector::{cosine_similarity, max_sim};

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("ButtonList of buttons"), vec!["button", "list", "of", "buttons"]);
        assert_eq!(tokenize("§ Section"), vec!["§", "section"]);
        assert!(tokenize("  ").is_empty());
    }

    #[test]
    fn test_dense_is_deterministic_and_normalized() {
        let embedder = HashEmbedder::new();
        let a = embedder.embed_dense("status card with buttons").unwrap();
        let b = embedder.embed_dense("status card with buttons").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), DEFAULT_DIMENSIONS);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_lexical_overlap_scores_higher() {
        let embedder = HashEmbedder::new();
        let q = embedder.embed_dense("button list").unwrap();
        let near = embedder.embed_dense("list of buttons").unwrap();
        let far = embedder.embed_dense("image grid").unwrap();
        assert!(cosine_similarity(&q, &near) > cosine_similarity(&q, &far));
    }

    #[test]
    fn test_multivector_one_per_token() {
        let embedder = HashEmbedder::with_dimensions(32);
        let mv = embedder.embed_multivector("Decorated Text").unwrap();
        assert_eq!(mv.len(), 2);
        assert!(mv.iter().all(|v| v.len() == 32));

        let same = embedder.embed_multivector("decorated text").unwrap();
        assert!(max_sim(&mv, &same) > 0.99);
    }

    #[test]
    fn test_empty_text_is_rejected() {
        let embedder = HashEmbedder::new();
        assert!(embedder.embed_dense("").is_err());
        assert!(embedder.embed_multivector("   ").is_err());
    }

    #[test]
    fn test_embed_by_strategy() {
        let embedder = HashEmbedder::new();
        let dense = embedder
            .embed("section", EmbeddingStrategy::Dense)
            .unwrap();
        assert_eq!(dense.shape(), "dense");
        let multi = embedder
            .embed("section", EmbeddingStrategy::MultiVector)
            .unwrap();
        assert_eq!(multi.shape(), "multi");
    }
}
