//! Retrieval query and result types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use super::Feedback;
use crate::storage::VectorData;

/// Kind of point stored in the vector collection (payload field `type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointType {
    /// An indexed library component.
    Component,
    /// A stored usage instance.
    Pattern,
    /// A promoted template.
    Template,
}

impl PointType {
    /// Returns the payload value for this type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Component => "component",
            Self::Pattern => "pattern",
            Self::Template => "template",
        }
    }

    /// Parses a payload type value.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "component" => Some(Self::Component),
            "pattern" => Some(Self::Pattern),
            "template" => Some(Self::Template),
            _ => None,
        }
    }
}

impl fmt::Display for PointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload filter pushed down into every constituent vector query.
///
/// Empty fields match everything.
///
/// | Field | Payload field | Semantics |
/// |-------|---------------|-----------|
/// | `point_types` | `type` | one of |
/// | `paths` | `full_path` / `components` | allow-list |
/// | `feedback` | `feedback` | one of |
/// | `exclude_feedback` | `feedback` | none of |
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointFilter {
    /// Allowed point types.
    pub point_types: Vec<PointType>,
    /// Component-path allow-list.
    pub paths: Vec<String>,
    /// Allowed feedback states.
    pub feedback: Vec<Feedback>,
    /// Rejected feedback states.
    pub exclude_feedback: Vec<Feedback>,
}

impl PointFilter {
    /// Creates an empty filter (matches all).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            point_types: Vec::new(),
            paths: Vec::new(),
            feedback: Vec::new(),
            exclude_feedback: Vec::new(),
        }
    }

    /// Adds a point type.
    #[must_use]
    pub fn with_type(mut self, point_type: PointType) -> Self {
        self.point_types.push(point_type);
        self
    }

    /// Adds a path to the allow-list.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.paths.push(path.into());
        self
    }

    /// Adds an allowed feedback state.
    #[must_use]
    pub fn with_feedback(mut self, feedback: Feedback) -> Self {
        self.feedback.push(feedback);
        self
    }

    /// Adds a rejected feedback state.
    #[must_use]
    pub fn without_feedback(mut self, feedback: Feedback) -> Self {
        self.exclude_feedback.push(feedback);
        self
    }

    /// Returns true if the filter is empty (matches all).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.point_types.is_empty()
            && self.paths.is_empty()
            && self.feedback.is_empty()
            && self.exclude_feedback.is_empty()
    }

    /// Tests a point payload against the filter.
    ///
    /// Components pass the allow-list when their `full_path` is listed;
    /// patterns and templates pass when every component they use is listed.
    #[must_use]
    pub fn matches(&self, payload: &Value) -> bool {
        if !self.point_types.is_empty() {
            let point_type = payload
                .get("type")
                .and_then(Value::as_str)
                .and_then(PointType::parse);
            if !point_type.is_some_and(|t| self.point_types.contains(&t)) {
                return false;
            }
        }

        if !self.paths.is_empty() && !self.paths_allowed(payload) {
            return false;
        }

        if !self.feedback.is_empty() || !self.exclude_feedback.is_empty() {
            let feedback = payload
                .get("feedback")
                .and_then(Value::as_str)
                .and_then(Feedback::parse)
                .unwrap_or_default();
            if !self.feedback.is_empty() && !self.feedback.contains(&feedback) {
                return false;
            }
            if self.exclude_feedback.contains(&feedback) {
                return false;
            }
        }

        true
    }

    fn paths_allowed(&self, payload: &Value) -> bool {
        let allowed = |p: &str| self.paths.iter().any(|a| a == p);

        if let Some(path) = payload.get("full_path").and_then(Value::as_str) {
            return allowed(path);
        }

        let Some(components) = payload.get("components").and_then(Value::as_array) else {
            return false;
        };
        !components.is_empty()
            && components.iter().all(|c| {
                c.as_str()
                    .or_else(|| c.get("path").and_then(Value::as_str))
                    .is_some_and(allowed)
            })
    }
}

/// One named-vector query within a retrieval request.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedQuery {
    /// Named vector field to search.
    pub vector: String,
    /// Query representation; must match the field's shape.
    pub query: VectorData,
}

/// A multi-vector retrieval request. Ephemeral, created per call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalQuery {
    /// One query per named vector.
    pub queries: Vec<NamedQuery>,
    /// Payload filter applied inside each constituent query.
    pub filter: PointFilter,
    /// Maximum fused results.
    pub limit: usize,
}

/// A fused retrieval result.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedHit {
    /// Point ID.
    pub id: String,
    /// Reciprocal Rank Fusion score.
    pub score: f64,
    /// 1-based rank of the point in each list it appeared in, keyed by list
    /// name. Repeated names are suffixed to stay distinct.
    pub ranks: BTreeMap<String, usize>,
    /// Number of ranked lists the point appeared in.
    pub lists: usize,
    /// Payload of the point.
    pub payload: Value,
}

impl FusedHit {
    /// Number of ranked lists the point appeared in.
    #[must_use]
    pub const fn list_count(&self) -> usize {
        self.lists
    }

    /// Payload `type`, if recognised.
    #[must_use]
    pub fn point_type(&self) -> Option<PointType> {
        self.payload
            .get("type")
            .and_then(Value::as_str)
            .and_then(PointType::parse)
    }
}
