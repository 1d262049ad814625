//! Composition root.
//!
//! [`ComponentEngine`] owns the index handle, the resolution cache, the
//! retriever, the pattern store and the promotion machine. Boundary clients
//! are injected through [`EngineBoundaries`]; nothing is discovered at
//! runtime.
//!
//! # Lifecycle
//!
//! ```text
//! new ──► reindex ──► parse / validate / build_notation
//!             │        search_components / resolve
//!             │        plan ──► pattern stored
//!             │        feedback ──► promotion
//!             └──────► reindex (library changed)
//! ```

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::instrument;

use super::component_index::{ComponentSync, sync_component_points};
use super::patterns::{PatternFilter, PatternRequest, PatternStore};
use super::promotion::{PromotionMachine, PromotionOutcome, PromotionThresholds, decode_template};
use super::resolution_cache::{CacheTier, TieredCache};
use super::retrieval::{MultiVectorRetriever, VectorSpec};
use super::variations::VariationGenerator;
use crate::config::CardsmithConfig;
use crate::dsl::{self, NotationTree, ValidationReport};
use crate::embedding::Embedder;
use crate::index::{IndexHandle, IndexReport, Indexer, LibraryIndex};
use crate::library::ComponentLibrary;
use crate::models::{
    Feedback, InstancePattern, PatternId, PatternMatch, PatternVariation, PointFilter, PointType,
    PromotionState, ResolvedComponent, Template, VariationKind,
};
use crate::storage::{ResolutionStore, TemplateArtifactStore, VectorStore};
use crate::{Error, Result};

/// Boundary clients the engine is composed from.
pub struct EngineBoundaries {
    /// Component library (L3 and introspection).
    pub library: Arc<dyn ComponentLibrary>,
    /// Named-vector point collection.
    pub store: Arc<dyn VectorStore>,
    /// Text embedder.
    pub embedder: Arc<dyn Embedder>,
    /// On-disk resolution tier; `None` runs the cache with L1 and L3 only.
    pub resolution: Option<Arc<dyn ResolutionStore>>,
    /// Durable template artifacts.
    pub artifacts: Arc<dyn TemplateArtifactStore>,
}

/// Tunables taken from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// L1 capacity.
    pub l1_capacity: usize,
    /// RRF smoothing constant.
    pub rrf_k: f64,
    /// Default number of fused results.
    pub limit: usize,
    /// Candidates requested per named vector.
    pub per_vector_limit: usize,
    /// Named vectors of the collection.
    pub vectors: Vec<VectorSpec>,
    /// Promotion thresholds.
    pub thresholds: PromotionThresholds,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            l1_capacity: super::resolution_cache::DEFAULT_L1_CAPACITY,
            rrf_k: super::rrf_fusion::DEFAULT_RRF_K,
            limit: super::rrf_fusion::DEFAULT_LIMIT,
            per_vector_limit: super::retrieval::DEFAULT_PER_VECTOR_LIMIT,
            vectors: VectorSpec::defaults(),
            thresholds: PromotionThresholds::default(),
        }
    }
}

impl EngineSettings {
    /// Reads settings from a loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for inconsistent promotion thresholds.
    pub fn from_config(config: &CardsmithConfig) -> Result<Self> {
        Ok(Self {
            l1_capacity: config.cache.l1_capacity,
            rrf_k: config.retrieval.rrf_k,
            limit: config.retrieval.limit,
            per_vector_limit: config.retrieval.per_vector_limit,
            vectors: config.retrieval.vectors.clone(),
            thresholds: PromotionThresholds::new(
                config.promotion.template_threshold,
                config.promotion.materialize_threshold,
            )?,
        })
    }
}

/// A request to plan a card build.
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    /// Component paths, display names or symbols, in build order.
    pub components: Vec<String>,
    /// Parameter values for the build.
    pub params: BTreeMap<String, Value>,
    /// Intent; may be empty.
    pub description: String,
    /// Owning session or user.
    pub owner: Option<String>,
}

impl BuildRequest {
    /// Creates a request for the given components.
    #[must_use]
    pub fn new<I, S>(components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            components: components.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Sets one parameter value.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    /// Sets the intent.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the owner.
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

/// One resolved component of a plan.
#[derive(Debug, Clone)]
pub struct BuildStep {
    /// The resolved component.
    pub component: Arc<ResolvedComponent>,
    /// Parameters owned by this component.
    pub params: BTreeMap<String, Value>,
    /// Cache tier that served the resolution.
    pub tier: CacheTier,
}

/// Ordered, resolved components handed to the renderer.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    /// Notation, when the components nest into a valid tree.
    pub notation: Option<String>,
    /// Steps in build order.
    pub steps: Vec<BuildStep>,
    /// Pattern recorded for this build, if any.
    pub pattern_id: Option<PatternId>,
}

impl BuildPlan {
    /// Component paths in build order.
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.component.path.as_str()).collect()
    }
}

/// A component search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentMatch {
    /// Component path.
    pub path: String,
    /// Display name.
    pub name: String,
    /// Notation symbol.
    pub symbol: Option<String>,
    /// Fused score.
    pub score: f64,
    /// 1-based rank per named vector that returned the component.
    pub ranks: BTreeMap<String, usize>,
}

/// A listed template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateListing {
    /// Template name.
    pub name: String,
    /// Source description.
    pub description: String,
    /// `template_eligible` or `materialized`.
    pub state: PromotionState,
    /// Component paths in build order.
    pub components: Vec<String>,
}

/// Semantic component engine.
pub struct ComponentEngine {
    library: Arc<dyn ComponentLibrary>,
    index: Arc<IndexHandle>,
    cache: TieredCache,
    retriever: Arc<MultiVectorRetriever>,
    patterns: PatternStore,
    variations: VariationGenerator,
    artifacts: Arc<dyn TemplateArtifactStore>,
    limit: usize,
    reindex_lock: Mutex<()>,
}

impl ComponentEngine {
    /// Composes an engine. The index is empty until [`Self::reindex`].
    #[must_use]
    pub fn new(boundaries: EngineBoundaries, settings: EngineSettings) -> Self {
        let index = Arc::new(IndexHandle::new(LibraryIndex::empty()));

        let mut cache = TieredCache::with_capacity(boundaries.library.clone(), settings.l1_capacity);
        if let Some(l2) = boundaries.resolution {
            cache = cache.with_l2(l2);
        }

        let retriever = Arc::new(
            MultiVectorRetriever::new(boundaries.store, boundaries.embedder)
                .with_vectors(settings.vectors)
                .with_rrf_k(settings.rrf_k)
                .with_per_vector_limit(settings.per_vector_limit),
        );
        let promotion = Arc::new(
            PromotionMachine::new(retriever.clone(), boundaries.artifacts.clone(), index.clone())
                .with_thresholds(settings.thresholds),
        );

        Self {
            library: boundaries.library,
            patterns: PatternStore::new(retriever.clone(), promotion),
            variations: VariationGenerator::new(index.clone()),
            index,
            cache,
            retriever,
            artifacts: boundaries.artifacts,
            limit: settings.limit,
            reindex_lock: Mutex::new(()),
        }
    }

    /// Introspects the library, rebuilds the index and publishes it.
    ///
    /// Component points are synced before the swap, so readers never see a
    /// snapshot whose components are missing from the collection. The cache
    /// drops L2 rows resolved from a different library.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SymbolExhausted`], [`Error::CycleDetected`] or
    /// [`Error::InvalidInput`] from indexing, and
    /// [`Error::BoundaryUnavailable`] if component points cannot be written.
    /// On error the previous snapshot stays published.
    #[instrument(skip(self), fields(components = tracing::field::Empty))]
    pub fn reindex(&self) -> Result<IndexReport> {
        let _guard = self.reindex_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let start = Instant::now();

        let descriptors = self.library.describe()?;
        let (index, report) = Indexer::build(&descriptors, &self.library.overrides())?;
        let ComponentSync { upserted, removed } = sync_component_points(&self.retriever, &index)?;

        // Invalidate before publishing so no reader of the new index sees
        // resolutions cached from the old library.
        if let Err(e) = self.cache.reconcile(&report.fingerprint) {
            tracing::warn!(error = %e, "Could not reconcile L2 with the new library");
        }
        self.index.publish(index);

        tracing::Span::current().record("components", report.components);
        tracing::info!(
            components = report.components,
            edges = report.edges,
            rejected = report.rejected_edges.len(),
            upserted,
            removed,
            duration_ms = start.elapsed().as_millis(),
            "Reindexed library"
        );
        Ok(report)
    }

    /// Current index snapshot.
    #[must_use]
    pub fn index(&self) -> Arc<LibraryIndex> {
        self.index.load()
    }

    /// Resolution cache.
    #[must_use]
    pub const fn cache(&self) -> &TieredCache {
        &self.cache
    }

    /// Pattern store.
    #[must_use]
    pub const fn patterns(&self) -> &PatternStore {
        &self.patterns
    }

    /// Parses notation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] with the offending position.
    pub fn parse(&self, notation: &str) -> Result<NotationTree> {
        Ok(dsl::parse(notation)?)
    }

    /// Parses and validates notation against the current snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the notation does not parse. Violations
    /// are returned in the report, not as an error.
    pub fn validate(&self, notation: &str) -> Result<ValidationReport> {
        let tree = dsl::parse(notation)?;
        Ok(dsl::validate(&tree, &self.index.load()))
    }

    /// Derives notation for components given by path, name or symbol.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ComponentNotFound`] for unknown items and
    /// [`Error::Validation`] if they do not nest under one root.
    pub fn build_notation<S: AsRef<str>>(&self, items: &[S]) -> Result<NotationTree> {
        let index = self.index.load();
        let paths = resolve_items(&index, items)?;
        dsl::build(&index, &paths)
    }

    /// Expands notation into component paths in build order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] or [`Error::Validation`].
    pub fn expand(&self, notation: &str) -> Result<Vec<String>> {
        let tree = dsl::parse(notation)?;
        dsl::expand(&tree, &self.index.load())
    }

    /// Resolves one component through the cache.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ComponentNotFound`] if the library does not know it.
    pub fn resolve(&self, path: &str) -> Result<Arc<ResolvedComponent>> {
        Ok(self.cache.resolve(path)?.component)
    }

    /// Searches components by natural-language description.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BoundaryUnavailable`] if retrieval fails.
    #[instrument(skip(self, paths), fields(query_len = query.len(), results = tracing::field::Empty))]
    pub fn search_components(
        &self,
        query: &str,
        paths: &[String],
        limit: Option<usize>,
    ) -> Result<Vec<ComponentMatch>> {
        let mut filter = PointFilter::new().with_type(PointType::Component);
        filter.paths = paths.to_vec();
        let hits = self
            .retriever
            .search_text(query, &filter, limit.unwrap_or(self.limit))?;

        let matches: Vec<ComponentMatch> = hits
            .into_iter()
            .map(|hit| ComponentMatch {
                path: payload_str(&hit.payload, "full_path").unwrap_or_default(),
                name: payload_str(&hit.payload, "name").unwrap_or_default(),
                symbol: payload_str(&hit.payload, "symbol"),
                score: hit.score,
                ranks: hit.ranks,
            })
            .collect();
        tracing::Span::current().record("results", matches.len());
        Ok(matches)
    }

    /// Plans a build: notation, resolution and pattern capture.
    ///
    /// When the components do not nest into one valid tree the plan carries
    /// no notation and lists them flat. Every successful plan is recorded as
    /// a pattern; a failure to record it is logged and does not fail the
    /// plan.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty request or ambiguous
    /// names, and [`Error::ComponentNotFound`] if any component cannot be
    /// resolved.
    #[instrument(skip(self, request), fields(components = request.components.len(), pattern_id = tracing::field::Empty))]
    pub fn plan(&self, request: BuildRequest) -> Result<BuildPlan> {
        if request.components.is_empty() {
            return Err(Error::InvalidInput(
                "a build needs at least one component".to_string(),
            ));
        }
        let index = self.index.load();
        let paths = resolve_items(&index, &request.components)?;

        let notation = match dsl::build(&index, &paths) {
            Ok(tree) => Some(tree.to_string()),
            Err(Error::Validation(report)) => {
                tracing::debug!(violations = report.violations.len(), "Planning flat build");
                None
            },
            Err(Error::InvalidInput(reason)) => {
                tracing::debug!(%reason, "Planning flat build");
                None
            },
            Err(e) => return Err(e),
        };

        let steps = self.resolve_steps(&index, &paths, &request.params)?;

        let mut pattern =
            PatternRequest::new(paths, request.description).with_params(request.params);
        pattern.notation.clone_from(&notation);
        pattern.owner = request.owner;
        let pattern_id = match self.patterns.store(pattern) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(error = %e, "Could not record build pattern");
                None
            },
        };
        if let Some(id) = &pattern_id {
            tracing::Span::current().record("pattern_id", id.as_str());
        }

        Ok(BuildPlan {
            notation,
            steps,
            pattern_id,
        })
    }

    fn resolve_steps(
        &self,
        index: &LibraryIndex,
        paths: &[String],
        params: &BTreeMap<String, Value>,
    ) -> Result<Vec<BuildStep>> {
        let assignment = index.assign_params(paths, params);
        paths
            .iter()
            .zip(assignment)
            .map(|(path, names)| {
                let resolution = self.cache.resolve(path)?;
                let params = names
                    .into_iter()
                    .filter_map(|name| params.get(&name).map(|v| (name, v.clone())))
                    .collect();
                Ok(BuildStep {
                    component: resolution.component,
                    params,
                    tier: resolution.tier,
                })
            })
            .collect()
    }

    /// Stores a pattern directly.
    ///
    /// # Errors
    ///
    /// See [`PatternStore::store`].
    pub fn store_pattern(&self, request: PatternRequest) -> Result<PatternId> {
        self.patterns.store(request)
    }

    /// Records feedback for a pattern.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown pattern.
    pub fn feedback(&self, id: &PatternId, feedback: Feedback) -> Result<PromotionOutcome> {
        self.patterns.update_feedback(id, feedback)
    }

    /// Finds patterns similar to a description.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BoundaryUnavailable`] if retrieval fails.
    pub fn similar_patterns(
        &self,
        description: &str,
        filter: &PatternFilter,
    ) -> Result<Vec<PatternMatch>> {
        self.patterns.query_similar(description, filter)
    }

    /// Generates variations of a stored pattern.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown pattern.
    pub fn variations(
        &self,
        id: &PatternId,
        kind: VariationKind,
        max: usize,
    ) -> Result<Vec<PatternVariation>> {
        let pattern = self.pattern(id)?;
        Ok(self.variations.generate(&pattern, kind, max))
    }

    fn pattern(&self, id: &PatternId) -> Result<InstancePattern> {
        self.patterns
            .get(id)?
            .ok_or_else(|| Error::NotFound(format!("pattern {id}")))
    }

    /// Loads a template by name, preferring the durable artifact.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if neither the artifact nor the template
    /// point exists.
    pub fn template(&self, name: &str) -> Result<Template> {
        if let Some(template) = self.artifacts.load(name)? {
            return Ok(template);
        }
        self.retriever
            .store()
            .get(&Template::point_id_for(name))
            .map_err(|e| Error::boundary("vector store", e))?
            .ok_or_else(|| Error::NotFound(format!("template {name}")))
            .and_then(|point| decode_template(&point.payload))
    }

    /// Plans a build from a template.
    ///
    /// Templates are proven builds, so no new pattern is recorded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown template,
    /// [`Error::InvalidInput`] for a placeholder without value or default,
    /// and [`Error::ComponentNotFound`] if a component cannot be resolved.
    #[instrument(skip(self, values), fields(template = name))]
    pub fn plan_template(&self, name: &str, values: &BTreeMap<String, Value>) -> Result<BuildPlan> {
        let template = self.template(name)?;
        let steps = template
            .instantiate(values)?
            .into_iter()
            .map(|(path, params)| {
                let resolution = self.cache.resolve(&path)?;
                Ok(BuildStep {
                    component: resolution.component,
                    params,
                    tier: resolution.tier,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(BuildPlan {
            notation: template.notation,
            steps,
            pattern_id: None,
        })
    }

    /// Lists promoted templates, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BoundaryUnavailable`] if the store fails.
    pub fn templates(&self) -> Result<Vec<TemplateListing>> {
        let points = self
            .retriever
            .store()
            .scroll(&PointFilter::new().with_type(PointType::Template))
            .map_err(|e| Error::boundary("vector store", e))?;

        let mut listings = Vec::with_capacity(points.len());
        for point in points {
            let template = decode_template(&point.payload)?;
            let state = if template.materialized_at.is_some() {
                PromotionState::Materialized
            } else {
                PromotionState::TemplateEligible
            };
            listings.push(TemplateListing {
                components: template.component_paths(),
                name: template.name,
                description: template.description,
                state,
            });
        }
        listings.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listings)
    }

    /// Removes unpromoted, unliked patterns created before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BoundaryUnavailable`] if the store fails.
    pub fn sweep(&self, cutoff: u64) -> Result<usize> {
        self.patterns.sweep(cutoff)
    }
}

fn resolve_items<S: AsRef<str>>(index: &LibraryIndex, items: &[S]) -> Result<Vec<String>> {
    items
        .iter()
        .map(|item| index.resolve_name(item.as_ref().trim()))
        .collect()
}

fn payload_str(payload: &Value, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(String::from)
}
