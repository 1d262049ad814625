//! Business logic services.
//!
//! Services orchestrate the index, the storage boundaries and the embedder
//! and provide the high-level operations. [`ComponentEngine`] composes them.

mod component_index;
mod engine;
mod patterns;
mod promotion;
mod resolution_cache;
mod retrieval;
mod rrf_fusion;
mod variations;

pub use component_index::{
    COMPONENT_POINT_PREFIX, ComponentSync, component_point_id, component_texts,
    sync_component_points,
};
pub use engine::{
    BuildPlan, BuildRequest, BuildStep, ComponentEngine, ComponentMatch, EngineBoundaries,
    EngineSettings, TemplateListing,
};
pub use patterns::{
    DEFAULT_SIMILAR_LIMIT, PatternFilter, PatternRequest, PatternStore, pattern_texts,
};
pub use promotion::{PromotionMachine, PromotionOutcome, PromotionThresholds, decode_template};
pub use resolution_cache::{
    CacheStats, CacheTier, DEFAULT_L1_CAPACITY, Resolution, TieredCache,
};
pub use retrieval::{DEFAULT_PER_VECTOR_LIMIT, MultiVectorRetriever, PointTexts, VectorSpec};
pub use rrf_fusion::{DEFAULT_LIMIT, DEFAULT_RRF_K, RankedList, RrfConfig, RrfFusion};
pub use variations::{DEFAULT_MAX_VARIATIONS, VariationGenerator};
