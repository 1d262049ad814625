//! Multi-vector retrieval.
//!
//! One task per named vector, run concurrently on scoped threads: each task
//! embeds the text for its vector and queries the store. The join is the
//! fan-in barrier before Reciprocal Rank Fusion. The payload filter is
//! pushed down into every constituent query so fusion never sees a point
//! the caller excluded.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

use super::{RankedList, RrfConfig, RrfFusion};
use crate::embedding::{Embedder, EmbeddingStrategy};
use crate::models::{FusedHit, NamedQuery, PointFilter, RetrievalQuery};
use crate::storage::{VectorData, VectorStore};
use crate::{Error, Result};

/// Default number of hits requested from each named vector.
pub const DEFAULT_PER_VECTOR_LIMIT: usize = 50;

/// A named vector field and the representation it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorSpec {
    /// Field name.
    pub name: String,
    /// Representation.
    pub strategy: EmbeddingStrategy,
}

impl VectorSpec {
    /// A dense field.
    #[must_use]
    pub fn dense(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            strategy: EmbeddingStrategy::Dense,
        }
    }

    /// A multi-vector field.
    #[must_use]
    pub fn multi(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            strategy: EmbeddingStrategy::MultiVector,
        }
    }

    /// `identity` (multi), `content` (dense), `structure` (dense).
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::multi("identity"),
            Self::dense("content"),
            Self::dense("structure"),
        ]
    }
}

/// Texts embedded into each named vector of a stored point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointTexts {
    /// Names, symbols, descriptions.
    pub identity: String,
    /// Documentation and parameter values.
    pub content: String,
    /// Containment neighbourhood or notation.
    pub structure: String,
}

impl PointTexts {
    /// Text for a named vector. Unknown names embed the content text.
    #[must_use]
    pub fn text_for(&self, vector: &str) -> &str {
        let text = match vector {
            "identity" => &self.identity,
            "structure" => &self.structure,
            _ => &self.content,
        };
        if text.trim().is_empty() {
            &self.identity
        } else {
            text
        }
    }
}

/// Multi-vector retriever over one vector store.
pub struct MultiVectorRetriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    vectors: Vec<VectorSpec>,
    rrf_k: f64,
    per_vector_limit: usize,
}

impl MultiVectorRetriever {
    /// Creates a retriever over the default named vectors.
    #[must_use]
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            vectors: VectorSpec::defaults(),
            rrf_k: RrfConfig::default().k,
            per_vector_limit: DEFAULT_PER_VECTOR_LIMIT,
        }
    }

    /// Sets the named vectors queried per request.
    #[must_use]
    pub fn with_vectors(mut self, vectors: Vec<VectorSpec>) -> Self {
        if !vectors.is_empty() {
            self.vectors = vectors;
        }
        self
    }

    /// Sets the RRF k constant.
    #[must_use]
    pub const fn with_rrf_k(mut self, k: f64) -> Self {
        self.rrf_k = k;
        self
    }

    /// Sets how many hits each named vector contributes to fusion.
    #[must_use]
    pub fn with_per_vector_limit(mut self, limit: usize) -> Self {
        self.per_vector_limit = limit.max(1);
        self
    }

    /// Configured named vectors.
    #[must_use]
    pub fn vectors(&self) -> &[VectorSpec] {
        &self.vectors
    }

    /// The underlying vector store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Embeds `text` once per configured named vector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for text the embedder rejects and
    /// [`Error::BoundaryUnavailable`] if the embedder fails.
    pub fn embed_queries(&self, text: &str) -> Result<Vec<NamedQuery>> {
        self.vectors
            .iter()
            .map(|spec| {
                let query = self
                    .embedder
                    .embed(text, spec.strategy)
                    .map_err(|e| boundary_error("embedder", e))?;
                Ok(NamedQuery {
                    vector: spec.name.clone(),
                    query,
                })
            })
            .collect()
    }

    /// Embeds the named vectors of a point to be stored, concurrently.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BoundaryUnavailable`] if the embedder fails.
    pub fn embed_point(&self, texts: &PointTexts) -> Result<BTreeMap<String, VectorData>> {
        let vectors = fan_out(&self.vectors, |spec| {
            self.embed_one(texts.text_for(&spec.name), spec)
        })?;
        Ok(self
            .vectors
            .iter()
            .map(|spec| spec.name.clone())
            .zip(vectors)
            .collect())
    }

    fn embed_one(&self, text: &str, spec: &VectorSpec) -> Result<VectorData> {
        self.embedder
            .embed(text, spec.strategy)
            .map_err(|e| boundary_error("embedder", e))
    }

    fn query_one(
        &self,
        vector: &str,
        query: &VectorData,
        filter: &PointFilter,
        limit: usize,
    ) -> Result<RankedList> {
        let hits = self
            .store
            .query(vector, query, filter, limit)
            .map_err(|e| boundary_error("vector store", e))?;
        Ok(RankedList::new(vector, hits))
    }

    fn fuse(&self, lists: &[RankedList], limit: usize) -> Vec<FusedHit> {
        RrfFusion::with_config(RrfConfig::with_limit(limit).with_k(self.rrf_k)).fuse(lists)
    }

    /// Runs every named-vector query and fuses the ranked lists.
    ///
    /// A failing constituent query fails the whole retrieval: a missing
    /// list would silently change every fused rank.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty query set or a shape
    /// mismatch, and [`Error::BoundaryUnavailable`] if the store fails.
    #[instrument(
        skip(self, query),
        fields(vectors = query.queries.len(), limit = query.limit)
    )]
    pub fn retrieve(&self, query: &RetrievalQuery) -> Result<Vec<FusedHit>> {
        let start = Instant::now();
        let result = self.retrieve_inner(query);
        record_retrieval(start, &result);
        result
    }

    fn retrieve_inner(&self, query: &RetrievalQuery) -> Result<Vec<FusedHit>> {
        if query.queries.is_empty() {
            return Err(Error::InvalidInput(
                "retrieval needs at least one named-vector query".to_string(),
            ));
        }
        if query.limit == 0 {
            return Ok(Vec::new());
        }

        let per_vector = self.per_vector_limit.max(query.limit);
        let lists = fan_out(&query.queries, |q: &NamedQuery| {
            self.query_one(&q.vector, &q.query, &query.filter, per_vector)
        })?;
        Ok(self.fuse(&lists, query.limit))
    }

    /// Embeds `text` for every named vector and retrieves.
    ///
    /// Each named vector is embedded and queried in its own task; fusion
    /// waits for all of them.
    ///
    /// # Errors
    ///
    /// See [`Self::embed_queries`] and [`Self::retrieve`].
    #[instrument(skip(self, filter), fields(text_len = text.len()))]
    pub fn search_text(
        &self,
        text: &str,
        filter: &PointFilter,
        limit: usize,
    ) -> Result<Vec<FusedHit>> {
        let start = Instant::now();
        let per_vector = self.per_vector_limit.max(limit);
        let result = fan_out(&self.vectors, |spec| {
            let query = self.embed_one(text, spec)?;
            self.query_one(&spec.name, &query, filter, per_vector)
        })
        .map(|lists| self.fuse(&lists, limit));
        record_retrieval(start, &result);
        result
    }
}

/// Runs `task` once per item, concurrently when there is more than one.
/// Results keep item order; the first error in that order wins.
fn fan_out<T, R, F>(items: &[T], task: F) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> Result<R> + Sync,
{
    if let [only] = items {
        return Ok(vec![task(only)?]);
    }
    std::thread::scope(|scope| {
        let task = &task;
        let handles: Vec<_> = items
            .iter()
            .map(|item| scope.spawn(move || task(item)))
            .collect();
        handles
            .into_iter()
            .map(|h| {
                h.join()
                    .map_err(|_| Error::operation("retrieve", "retrieval thread panicked"))?
            })
            .collect()
    })
}

fn record_retrieval(start: Instant, result: &Result<Vec<FusedHit>>) {
    let status = if result.is_ok() { "success" } else { "error" };
    metrics::counter!("cardsmith_retrieval_total", "status" => status).increment(1);
    metrics::histogram!("cardsmith_retrieval_duration_ms")
        .record(start.elapsed().as_secs_f64() * 1000.0);
    if let Ok(hits) = result {
        tracing::debug!(hits = hits.len(), "Fused retrieval results");
    }
}

/// Wraps a boundary failure; caller mistakes pass through unchanged.
fn boundary_error(boundary: &str, err: Error) -> Error {
    match err {
        Error::InvalidInput(_) | Error::BoundaryUnavailable { .. } => err,
        other => Error::boundary(boundary, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::models::PointType;
    use crate::storage::{InMemoryVectorStore, Point, ScoredPoint};
    use serde_json::json;

    struct DownStore;

    impl VectorStore for DownStore {
        fn upsert(&self, _points: &[Point]) -> Result<()> {
            Err(Error::operation("upsert", "connection refused"))
        }
        fn query(
            &self,
            _vector_name: &str,
            _query: &VectorData,
            _filter: &PointFilter,
            _limit: usize,
        ) -> Result<Vec<ScoredPoint>> {
            Err(Error::operation("query", "connection refused"))
        }
        fn scroll(&self, _filter: &PointFilter) -> Result<Vec<Point>> {
            Err(Error::operation("scroll", "connection refused"))
        }
        fn get(&self, _id: &str) -> Result<Option<Point>> {
            Err(Error::operation("get", "connection refused"))
        }
        fn delete(&self, _ids: &[String]) -> Result<usize> {
            Err(Error::operation("delete", "connection refused"))
        }
        fn count(&self) -> Result<usize> {
            Err(Error::operation("count", "connection refused"))
        }
    }

    fn retriever() -> MultiVectorRetriever {
        let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
        let retriever = MultiVectorRetriever::new(store, Arc::new(HashEmbedder::new()));
        let docs = [
            ("p1", "pattern", "deployment status card with a restart button"),
            ("p2", "pattern", "image gallery grid"),
            ("t1", "template", "deployment pipeline overview"),
        ];
        let points: Vec<Point> = docs
            .iter()
            .map(|(id, kind, text)| {
                let texts = PointTexts {
                    identity: (*text).to_string(),
                    content: (*text).to_string(),
                    structure: String::new(),
                };
                let mut point = Point::new(*id, json!({"type": kind, "description": text}));
                point.vectors = retriever.embed_point(&texts).unwrap();
                point
            })
            .collect();
        retriever.store().upsert(&points).unwrap();
        retriever
    }

    #[test]
    fn test_search_text_ranks_closest_first() {
        let r = retriever();
        let hits = r
            .search_text("deployment status card", &PointFilter::new(), 10)
            .unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].id, "p1");
        assert_eq!(hits[0].list_count(), 3);
    }

    #[test]
    fn test_filter_pushed_into_each_query() {
        let r = retriever();
        let filter = PointFilter::new().with_type(PointType::Pattern);
        let hits = r.search_text("deployment status", &filter, 10).unwrap();
        assert!(hits.iter().all(|h| h.point_type() == Some(PointType::Pattern)));
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_limit_applies_after_fusion() {
        let r = retriever();
        let hits = r.search_text("status", &PointFilter::new(), 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(r.search_text("status", &PointFilter::new(), 0).unwrap().is_empty());
    }

    #[test]
    fn test_store_failure_is_boundary_unavailable() {
        let r = MultiVectorRetriever::new(Arc::new(DownStore), Arc::new(HashEmbedder::new()));
        let err = r
            .search_text("status", &PointFilter::new(), 5)
            .unwrap_err();
        assert!(matches!(err, Error::BoundaryUnavailable { .. }));
    }

    /// Counts how many embeddings run at once.
    struct SlowEmbedder {
        inner: HashEmbedder,
        active: std::sync::atomic::AtomicUsize,
        peak: std::sync::atomic::AtomicUsize,
    }

    impl SlowEmbedder {
        fn track<T>(&self, f: impl FnOnce() -> T) -> T {
            use std::sync::atomic::Ordering;
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(50));
            let out = f();
            self.active.fetch_sub(1, Ordering::SeqCst);
            out
        }
    }

    impl Embedder for SlowEmbedder {
        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }
        fn embed_dense(&self, text: &str) -> Result<Vec<f32>> {
            self.track(|| self.inner.embed_dense(text))
        }
        fn embed_multivector(&self, text: &str) -> Result<Vec<Vec<f32>>> {
            self.track(|| self.inner.embed_multivector(text))
        }
    }

    #[test]
    fn test_search_text_embeds_vectors_concurrently() {
        let embedder = Arc::new(SlowEmbedder {
            inner: HashEmbedder::new(),
            active: std::sync::atomic::AtomicUsize::new(0),
            peak: std::sync::atomic::AtomicUsize::new(0),
        });
        let r = MultiVectorRetriever::new(Arc::new(InMemoryVectorStore::new()), embedder.clone());
        let hits = r.search_text("status card", &PointFilter::new(), 5).unwrap();
        assert!(hits.is_empty());
        assert!(embedder.peak.load(std::sync::atomic::Ordering::SeqCst) > 1);
    }

    #[test]
    fn test_empty_queries_rejected() {
        let r = retriever();
        let query = RetrievalQuery {
            queries: Vec::new(),
            filter: PointFilter::new(),
            limit: 5,
        };
        assert!(matches!(r.retrieve(&query), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_point_texts_fall_back_to_identity() {
        let texts = PointTexts {
            identity: "Button".to_string(),
            content: String::new(),
            structure: "contains Icon".to_string(),
        };
        assert_eq!(texts.text_for("content"), "Button");
        assert_eq!(texts.text_for("structure"), "contains Icon");
        assert_eq!(texts.text_for("custom"), "Button");
    }
}
