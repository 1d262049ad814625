//! Data models for cardsmith.
//!
//! This module contains the core data structures shared by the indexing
//! pipeline, the retrieval services and the feedback loop.

mod component;
mod pattern;
mod search;
mod template;

pub use component::{
    Component, ComponentDescriptor, ComponentKind, EdgeKind, EdgeOverride, ParamSpec, ParamType,
    RelationshipEdge, ResolvedComponent, split_identifier,
};
pub use pattern::{
    Feedback, InstancePattern, PatternId, PatternMatch, PatternVariation, PromotionState,
    VariationKind,
};
pub use search::{FusedHit, NamedQuery, PointFilter, PointType, RetrievalQuery};
pub use template::{Template, TemplateComponent, placeholder, placeholders, template_name};
