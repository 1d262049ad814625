//! Instance pattern store.
//!
//! Every successful build is written back as a pattern point. Patterns are
//! never deduplicated: repeated builds are signal for the feedback loop.
//! Feedback updates are serialized so the read-modify-write of a pattern and
//! its promotion side effects commit together or not at all.

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::instrument;

use super::promotion::{Applied, PromotionMachine, PromotionOutcome, decode_template};
use super::{MultiVectorRetriever, PointTexts};
use crate::models::{
    Feedback, FusedHit, InstancePattern, PatternId, PatternMatch, PointFilter, PointType,
    PromotionState,
};
use crate::storage::{Point, VectorData};
use crate::{Error, Result, current_timestamp};

/// Default number of similar patterns returned.
pub const DEFAULT_SIMILAR_LIMIT: usize = 5;

/// A pattern to store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatternRequest {
    /// Component paths in build order.
    pub components: Vec<String>,
    /// Parameter values.
    pub params: BTreeMap<String, Value>,
    /// Natural-language intent.
    pub description: String,
    /// Initial feedback.
    pub feedback: Feedback,
    /// Notation, when derivable.
    pub notation: Option<String>,
    /// Owning session or user.
    pub owner: Option<String>,
}

impl PatternRequest {
    /// Creates a request with unset feedback.
    #[must_use]
    pub fn new(components: Vec<String>, description: impl Into<String>) -> Self {
        Self {
            components,
            description: description.into(),
            ..Self::default()
        }
    }

    /// Sets all parameter values.
    #[must_use]
    pub fn with_params(mut self, params: BTreeMap<String, Value>) -> Self {
        self.params = params;
        self
    }

    /// Adds one parameter value.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    /// Sets the initial feedback.
    #[must_use]
    pub const fn with_feedback(mut self, feedback: Feedback) -> Self {
        self.feedback = feedback;
        self
    }

    /// Sets the notation.
    #[must_use]
    pub fn with_notation(mut self, notation: impl Into<String>) -> Self {
        self.notation = Some(notation.into());
        self
    }

    /// Sets the owner.
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

/// Filters for [`PatternStore::query_similar`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternFilter {
    /// Only patterns built entirely from these component paths.
    pub paths: Vec<String>,
    /// Only these feedback states (empty means any).
    pub feedback: Vec<Feedback>,
    /// Keep patterns whose latest feedback is negative.
    pub include_negative: bool,
    /// Also return promoted templates.
    pub include_templates: bool,
    /// Maximum results.
    pub limit: usize,
}

impl Default for PatternFilter {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            feedback: Vec::new(),
            include_negative: false,
            include_templates: false,
            limit: DEFAULT_SIMILAR_LIMIT,
        }
    }
}

impl PatternFilter {
    /// Creates the default filter (negative patterns excluded).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to patterns built from these paths.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.paths.push(path.into());
        self
    }

    /// Restricts to a feedback state.
    #[must_use]
    pub fn with_feedback(mut self, feedback: Feedback) -> Self {
        self.feedback.push(feedback);
        self
    }

    /// Keeps negative patterns.
    #[must_use]
    pub const fn including_negative(mut self) -> Self {
        self.include_negative = true;
        self
    }

    /// Also returns templates.
    #[must_use]
    pub const fn including_templates(mut self) -> Self {
        self.include_templates = true;
        self
    }

    /// Sets the result limit.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    fn to_point_filter(&self) -> PointFilter {
        let mut filter = PointFilter::new().with_type(PointType::Pattern);
        if self.include_templates {
            filter = filter.with_type(PointType::Template);
        }
        filter.paths.clone_from(&self.paths);
        filter.feedback.clone_from(&self.feedback);
        if !self.include_negative {
            filter = filter.without_feedback(Feedback::Negative);
        }
        filter
    }
}

/// Store of instance patterns in the vector collection.
pub struct PatternStore {
    retriever: Arc<MultiVectorRetriever>,
    promotion: Arc<PromotionMachine>,
    write_lock: Mutex<()>,
}

impl PatternStore {
    /// Creates a pattern store.
    #[must_use]
    pub const fn new(retriever: Arc<MultiVectorRetriever>, promotion: Arc<PromotionMachine>) -> Self {
        Self {
            retriever,
            promotion,
            write_lock: Mutex::new(()),
        }
    }

    /// Stores a new pattern and returns its ID.
    ///
    /// Initial feedback counts as the first feedback event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a request without components, and
    /// [`Error::BoundaryUnavailable`] if the embedder or store fails. An
    /// empty description is allowed; the pattern is then embedded by its
    /// notation or component paths.
    #[instrument(skip(self, request), fields(components = request.components.len()))]
    pub fn store(&self, request: PatternRequest) -> Result<PatternId> {
        if request.components.is_empty() {
            return Err(Error::InvalidInput(
                "a pattern needs at least one component".to_string(),
            ));
        }
        let mut pattern = InstancePattern {
            id: PatternId::generate(),
            components: request.components,
            params: request.params,
            description: request.description,
            notation: request.notation,
            feedback: Feedback::Unset,
            positive_count: 0,
            negative_count: 0,
            state: PromotionState::Candidate,
            created_at: current_timestamp(),
            owner: request.owner,
        };
        let vectors = self.retriever.embed_point(&pattern_texts(&pattern))?;

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        pattern.record_feedback(request.feedback);
        let applied = self.check_promotion(&mut pattern, request.feedback)?;
        self.commit(&pattern, vectors, None, applied)?;

        metrics::counter!("cardsmith_patterns_stored_total").increment(1);
        tracing::info!(pattern_id = %pattern.id, "Stored pattern");
        Ok(pattern.id)
    }

    /// Records feedback for a pattern and runs the promotion check.
    ///
    /// Last write wins for the feedback state; counters accumulate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown pattern. Any failure
    /// leaves the pattern and its template exactly as they were.
    #[instrument(skip(self), fields(pattern_id = %id, feedback = feedback.as_str()))]
    pub fn update_feedback(&self, id: &PatternId, feedback: Feedback) -> Result<PromotionOutcome> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let point = self
            .retriever
            .store()
            .get(id.as_str())
            .map_err(|e| Error::boundary("vector store", e))?
            .filter(|p| is_type(&p.payload, PointType::Pattern))
            .ok_or_else(|| Error::NotFound(format!("pattern {id}")))?;
        let mut pattern = decode_pattern(&point.payload)?;

        pattern.record_feedback(feedback);
        let applied = self.check_promotion(&mut pattern, feedback)?;
        let mut outcome = applied.outcome.clone();
        outcome.artifact = self.commit(&pattern, point.vectors.clone(), Some(point), applied)?;

        metrics::counter!("cardsmith_feedback_total", "feedback" => feedback.as_str()).increment(1);
        Ok(outcome)
    }

    /// Only positive feedback can cross a threshold.
    fn check_promotion(&self, pattern: &mut InstancePattern, feedback: Feedback) -> Result<Applied> {
        if feedback == Feedback::Positive {
            self.promotion.advance(pattern)
        } else {
            Ok(Applied::unchanged(pattern))
        }
    }

    /// Saves the pattern, then writes any pending artifact.
    ///
    /// If either write fails, the pattern point is put back to `previous`
    /// (or removed when new) and the template point is rolled back, so no
    /// partial promotion is observable.
    fn commit(
        &self,
        pattern: &InstancePattern,
        vectors: BTreeMap<String, VectorData>,
        previous: Option<Point>,
        applied: Applied,
    ) -> Result<Option<PathBuf>> {
        let store = self.retriever.store();
        let mut point = Point::new(pattern.id.as_str(), pattern_payload(pattern)?);
        point.vectors = vectors;
        if let Err(e) = store.upsert(&[point]) {
            if let Some(undo) = applied.undo {
                self.promotion.rollback(undo);
            }
            return Err(Error::boundary("vector store", e));
        }

        let Some(template) = applied.pending else {
            return Ok(None);
        };
        match self.promotion.materialize(&template) {
            Ok(path) => Ok(Some(path)),
            Err(e) => {
                let restored = match previous {
                    Some(previous) => store.upsert(std::slice::from_ref(&previous)),
                    None => store.delete(&[pattern.id.as_str().to_string()]).map(|_| ()),
                };
                if let Err(restore) = restored {
                    tracing::warn!(error = %restore, pattern_id = %pattern.id, "Failed to restore pattern");
                }
                if let Some(undo) = applied.undo {
                    self.promotion.rollback(undo);
                }
                Err(e)
            },
        }
    }

    /// Finds stored patterns similar to a description.
    ///
    /// Hits carry their instance parameters (template hits carry defaults)
    /// so a caller can reuse proven values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BoundaryUnavailable`] if retrieval fails.
    #[instrument(skip(self, filter), fields(limit = filter.limit))]
    pub fn query_similar(
        &self,
        description: &str,
        filter: &PatternFilter,
    ) -> Result<Vec<PatternMatch>> {
        let hits = self
            .retriever
            .search_text(description, &filter.to_point_filter(), filter.limit)?;
        hits.into_iter().map(pattern_match).collect()
    }

    /// Fetches one pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the payload is corrupt.
    pub fn get(&self, id: &PatternId) -> Result<Option<InstancePattern>> {
        self.retriever
            .store()
            .get(id.as_str())
            .map_err(|e| Error::boundary("vector store", e))?
            .filter(|p| is_type(&p.payload, PointType::Pattern))
            .map(|p| decode_pattern(&p.payload))
            .transpose()
    }

    /// Lists every pattern, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or a payload is corrupt.
    pub fn list(&self) -> Result<Vec<InstancePattern>> {
        let mut patterns = self
            .retriever
            .store()
            .scroll(&PointFilter::new().with_type(PointType::Pattern))
            .map_err(|e| Error::boundary("vector store", e))?
            .iter()
            .map(|p| decode_pattern(&p.payload))
            .collect::<Result<Vec<_>>>()?;
        patterns.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(patterns)
    }

    /// Removes unproven patterns created before `cutoff` (Unix seconds).
    ///
    /// Only candidates whose latest feedback is unset or negative are
    /// removed; promoted patterns and positive candidates are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    #[instrument(skip(self))]
    pub fn sweep(&self, cutoff: u64) -> Result<usize> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let expired: Vec<String> = self
            .list()?
            .into_iter()
            .filter(|p| {
                p.created_at < cutoff
                    && p.state == PromotionState::Candidate
                    && p.feedback != Feedback::Positive
            })
            .map(|p| p.id.as_str().to_string())
            .collect();
        if expired.is_empty() {
            return Ok(0);
        }
        let removed = self
            .retriever
            .store()
            .delete(&expired)
            .map_err(|e| Error::boundary("vector store", e))?;
        metrics::counter!("cardsmith_patterns_swept_total").increment(removed as u64);
        tracing::info!(removed, cutoff, "Swept expired patterns");
        Ok(removed)
    }
}

fn is_type(payload: &Value, point_type: PointType) -> bool {
    payload.get("type").and_then(Value::as_str) == Some(point_type.as_str())
}

fn pattern_payload(pattern: &InstancePattern) -> Result<Value> {
    let mut payload =
        serde_json::to_value(pattern).map_err(|e| Error::operation("encode_pattern", e))?;
    if let Value::Object(map) = &mut payload {
        map.insert("type".into(), PointType::Pattern.as_str().into());
    }
    Ok(payload)
}

fn decode_pattern(payload: &Value) -> Result<InstancePattern> {
    serde_json::from_value(payload.clone()).map_err(|e| Error::operation("decode_pattern", e))
}

/// Texts embedded for a pattern.
#[must_use]
pub fn pattern_texts(pattern: &InstancePattern) -> PointTexts {
    let values: Vec<String> = pattern
        .params
        .values()
        .filter_map(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect();
    let intent = pattern.intent();
    PointTexts {
        content: format!("{intent} {}", values.join(" ")),
        identity: intent,
        structure: pattern
            .notation
            .clone()
            .unwrap_or_else(|| pattern.components.join(" ")),
    }
}

fn pattern_match(hit: FusedHit) -> Result<PatternMatch> {
    match hit.point_type() {
        Some(PointType::Template) => {
            let state = hit
                .payload
                .get("state")
                .cloned()
                .and_then(|s| serde_json::from_value(s).ok())
                .unwrap_or(PromotionState::TemplateEligible);
            let template = decode_template(&hit.payload)?;
            Ok(PatternMatch {
                id: hit.id,
                score: hit.score,
                point_type: PointType::Template,
                components: template.component_paths(),
                description: template.description,
                params: template.defaults,
                feedback: Feedback::Positive,
                state,
            })
        },
        _ => {
            let pattern = decode_pattern(&hit.payload)?;
            Ok(PatternMatch {
                id: hit.id,
                score: hit.score,
                point_type: PointType::Pattern,
                description: pattern.description,
                components: pattern.components,
                params: pattern.params,
                feedback: pattern.feedback,
                state: pattern.state,
            })
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::index::{IndexHandle, LibraryIndex};
    use crate::models::Template;
    use crate::services::PromotionThresholds;
    use crate::storage::{
        FilesystemTemplateStore, InMemoryVectorStore, ScoredPoint, TemplateArtifactStore,
        VectorStore,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> PatternStore {
        store_over(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(FilesystemTemplateStore::new(dir.path()).unwrap()),
            PromotionThresholds::default(),
        )
    }

    fn store_over(
        vectors: Arc<dyn VectorStore>,
        artifacts: Arc<dyn TemplateArtifactStore>,
        thresholds: PromotionThresholds,
    ) -> PatternStore {
        let retriever = Arc::new(MultiVectorRetriever::new(
            vectors,
            Arc::new(HashEmbedder::new()),
        ));
        let promotion = Arc::new(
            PromotionMachine::new(
                retriever.clone(),
                artifacts,
                Arc::new(IndexHandle::new(LibraryIndex::empty())),
            )
            .with_thresholds(thresholds),
        );
        PatternStore::new(retriever, promotion)
    }

    /// Vector store whose pattern writes fail while `full` is set.
    struct FullDisk {
        inner: InMemoryVectorStore,
        full: AtomicBool,
    }

    impl VectorStore for FullDisk {
        fn upsert(&self, points: &[Point]) -> Result<()> {
            if self.full.load(Ordering::SeqCst) && points.iter().any(|p| p.id.starts_with("pat_")) {
                return Err(Error::operation("upsert", "disk full"));
            }
            self.inner.upsert(points)
        }

        fn query(
            &self,
            vector_name: &str,
            query: &VectorData,
            filter: &PointFilter,
            limit: usize,
        ) -> Result<Vec<ScoredPoint>> {
            self.inner.query(vector_name, query, filter, limit)
        }

        fn scroll(&self, filter: &PointFilter) -> Result<Vec<Point>> {
            self.inner.scroll(filter)
        }

        fn get(&self, id: &str) -> Result<Option<Point>> {
            self.inner.get(id)
        }

        fn delete(&self, ids: &[String]) -> Result<usize> {
            self.inner.delete(ids)
        }

        fn count(&self) -> Result<usize> {
            self.inner.count()
        }
    }

    struct ReadOnlyArtifacts;

    impl TemplateArtifactStore for ReadOnlyArtifacts {
        fn write(&self, _template: &Template) -> Result<std::path::PathBuf> {
            Err(Error::operation("write_template", "read-only file system"))
        }

        fn load(&self, _name: &str) -> Result<Option<Template>> {
            Ok(None)
        }

        fn list(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    fn template_state(store: &PatternStore, name: &str) -> Value {
        store
            .retriever
            .store()
            .get(&Template::point_id_for(name))
            .unwrap()
            .unwrap()
            .payload["state"]
            .clone()
    }

    fn request(description: &str) -> PatternRequest {
        PatternRequest::new(
            vec!["card.Section".to_string(), "card.DecoratedText".to_string()],
            description,
        )
        .with_param("text", json!("All systems green"))
        .with_notation("§[δ]")
    }

    #[test]
    fn test_store_never_deduplicates() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let a = store.store(request("status card")).unwrap();
        let b = store.store(request("status card")).unwrap();
        assert_ne!(a, b);
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn test_store_rejects_empty_component_list() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(matches!(
            store.store(PatternRequest::new(Vec::new(), "x")),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_store_without_description() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let blank = store.store(request("  ")).unwrap();
        let bare = store
            .store(PatternRequest::new(vec!["card.Button".to_string()], ""))
            .unwrap();
        assert_ne!(blank, bare);
        assert_eq!(store.get(&blank).unwrap().unwrap().intent(), "§[δ]");
        assert_eq!(store.get(&bare).unwrap().unwrap().intent(), "card.Button");

        let hits = store.query_similar("§[δ]", &PatternFilter::new()).unwrap();
        assert_eq!(hits[0].id, blank.as_str());

        for _ in 0..3 {
            store.update_feedback(&blank, Feedback::Positive).unwrap();
        }
        let outcome = store.update_feedback(&bare, Feedback::Positive).unwrap();
        assert!(!outcome.promoted());
        let pattern = store.get(&blank).unwrap().unwrap();
        assert_eq!(pattern.state, PromotionState::TemplateEligible);
        assert_ne!(
            crate::models::template_name(&pattern.intent()),
            crate::models::template_name("")
        );
    }

    #[test]
    fn test_failed_pattern_save_leaves_no_artifact() {
        let dir = TempDir::new().unwrap();
        let vectors = Arc::new(FullDisk {
            inner: InMemoryVectorStore::new(),
            full: AtomicBool::new(false),
        });
        let artifacts = Arc::new(FilesystemTemplateStore::new(dir.path()).unwrap());
        let store = store_over(
            vectors.clone(),
            artifacts.clone(),
            PromotionThresholds::new(1, 2).unwrap(),
        );
        let id = store.store(request("deployment status card")).unwrap();
        let name = store
            .update_feedback(&id, Feedback::Positive)
            .unwrap()
            .template
            .unwrap();

        vectors.full.store(true, Ordering::SeqCst);
        let err = store.update_feedback(&id, Feedback::Positive).unwrap_err();
        assert!(matches!(err, Error::BoundaryUnavailable { .. }));

        let pattern = store.get(&id).unwrap().unwrap();
        assert_eq!(pattern.positive_count, 1);
        assert_eq!(pattern.state, PromotionState::TemplateEligible);
        assert_eq!(template_state(&store, &name), json!("template_eligible"));
        assert!(artifacts.load(&name).unwrap().is_none());

        vectors.full.store(false, Ordering::SeqCst);
        let outcome = store.update_feedback(&id, Feedback::Positive).unwrap();
        assert_eq!(outcome.state, PromotionState::Materialized);
        assert!(outcome.artifact.unwrap().exists());
        assert_eq!(artifacts.load(&name).unwrap().unwrap().positive_count, 2);
    }

    #[test]
    fn test_failed_artifact_write_restores_pattern() {
        let store = store_over(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(ReadOnlyArtifacts),
            PromotionThresholds::new(1, 2).unwrap(),
        );
        let id = store.store(request("deployment status card")).unwrap();
        let name = store
            .update_feedback(&id, Feedback::Positive)
            .unwrap()
            .template
            .unwrap();

        let err = store.update_feedback(&id, Feedback::Positive).unwrap_err();
        assert!(matches!(err, Error::BoundaryUnavailable { .. }));
        let pattern = store.get(&id).unwrap().unwrap();
        assert_eq!(pattern.positive_count, 1);
        assert_eq!(pattern.state, PromotionState::TemplateEligible);
        assert_eq!(template_state(&store, &name), json!("template_eligible"));
    }

    #[test]
    fn test_update_feedback_unknown_id() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let err = store
            .update_feedback(&PatternId::new("pat_missing"), Feedback::Positive)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_feedback_last_write_wins_and_promotes() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let id = store.store(request("deployment status card")).unwrap();

        for _ in 0..2 {
            let outcome = store.update_feedback(&id, Feedback::Positive).unwrap();
            assert!(!outcome.promoted());
        }
        store.update_feedback(&id, Feedback::Negative).unwrap();
        let outcome = store.update_feedback(&id, Feedback::Positive).unwrap();
        assert!(outcome.promoted());
        assert_eq!(outcome.state, PromotionState::TemplateEligible);

        let pattern = store.get(&id).unwrap().unwrap();
        assert_eq!(pattern.feedback, Feedback::Positive);
        assert_eq!(pattern.positive_count, 3);
        assert_eq!(pattern.negative_count, 1);
        assert_eq!(pattern.state, PromotionState::TemplateEligible);
    }

    #[test]
    fn test_negative_patterns_hidden_by_default() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let good = store.store(request("deployment status card")).unwrap();
        let bad = store
            .store(request("deployment status card").with_feedback(Feedback::Negative))
            .unwrap();

        let hits = store
            .query_similar("deployment status", &PatternFilter::new())
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert!(ids.contains(&good.as_str()));
        assert!(!ids.contains(&bad.as_str()));
        assert_eq!(hits[0].params["text"], json!("All systems green"));

        let all = store
            .query_similar("deployment status", &PatternFilter::new().including_negative())
            .unwrap();
        assert_eq!(all.len(), 2);
        assert!(store.get(&bad).unwrap().is_some());
    }

    #[test]
    fn test_templates_returned_on_request() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let id = store.store(request("deployment status card")).unwrap();
        for _ in 0..3 {
            store.update_feedback(&id, Feedback::Positive).unwrap();
        }
        let hits = store
            .query_similar(
                "deployment status card",
                &PatternFilter::new().including_templates(),
            )
            .unwrap();
        let template = hits
            .iter()
            .find(|h| h.point_type == PointType::Template)
            .unwrap();
        assert_eq!(template.components, vec!["card.Section", "card.DecoratedText"]);
        assert_eq!(template.params["text"], json!("All systems green"));

        let patterns_only = store
            .query_similar("deployment status card", &PatternFilter::new())
            .unwrap();
        assert!(patterns_only.iter().all(|h| h.point_type == PointType::Pattern));
    }

    #[test]
    fn test_sweep_keeps_promoted_and_positive() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let unset = store.store(request("one")).unwrap();
        let positive = store
            .store(request("two").with_feedback(Feedback::Positive))
            .unwrap();
        let promoted = store.store(request("three")).unwrap();
        for _ in 0..3 {
            store.update_feedback(&promoted, Feedback::Positive).unwrap();
        }

        assert_eq!(store.sweep(0).unwrap(), 0);
        let removed = store.sweep(u64::MAX).unwrap();
        assert_eq!(removed, 1);
        assert!(store.get(&unset).unwrap().is_none());
        assert!(store.get(&positive).unwrap().is_some());
        assert!(store.get(&promoted).unwrap().is_some());
    }
}
