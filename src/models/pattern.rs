//! Usage patterns, feedback and variations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::PointType;

/// Unique identifier for a stored instance pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternId(String);

impl PatternId {
    /// Creates a pattern ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh, time-ordered pattern ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("pat_{}", uuid::Uuid::now_v7().simple()))
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PatternId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PatternId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Latest feedback recorded for a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    /// No feedback yet.
    #[default]
    Unset,
    /// The build worked for the user.
    Positive,
    /// The build did not work for the user.
    Negative,
}

impl Feedback {
    /// Returns the feedback as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::Positive => "positive",
            Self::Negative => "negative",
        }
    }

    /// Parses a feedback string (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "unset" | "none" => Some(Self::Unset),
            "positive" | "good" | "up" | "+" => Some(Self::Positive),
            "negative" | "bad" | "down" | "-" => Some(Self::Negative),
            _ => None,
        }
    }
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Promotion state of a pattern.
///
/// Ordered: a pattern only ever moves to a greater state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PromotionState {
    /// Not yet proven.
    #[default]
    Candidate,
    /// Promoted to a queryable template point.
    TemplateEligible,
    /// Template additionally persisted as a durable artifact.
    Materialized,
}

impl PromotionState {
    /// Returns the state as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Candidate => "candidate",
            Self::TemplateEligible => "template_eligible",
            Self::Materialized => "materialized",
        }
    }

    /// State implied by a positive-feedback count alone.
    #[must_use]
    pub const fn for_positive_count(count: u32, template_at: u32, materialize_at: u32) -> Self {
        if count >= materialize_at {
            Self::Materialized
        } else if count >= template_at {
            Self::TemplateEligible
        } else {
            Self::Candidate
        }
    }
}

impl fmt::Display for PromotionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A concrete usage instance: which components, with what values, for what intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstancePattern {
    /// Pattern ID.
    pub id: PatternId,
    /// Component paths in build order.
    pub components: Vec<String>,
    /// Parameter values supplied for the build.
    #[serde(default)]
    pub params: BTreeMap<String, serde_json::Value>,
    /// Natural-language intent, possibly empty.
    pub description: String,
    /// Notation, when the components nest into a valid tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notation: Option<String>,
    /// Latest feedback (last write wins).
    #[serde(default)]
    pub feedback: Feedback,
    /// Number of positive feedback events.
    #[serde(default)]
    pub positive_count: u32,
    /// Number of negative feedback events.
    #[serde(default)]
    pub negative_count: u32,
    /// Promotion state.
    #[serde(default)]
    pub state: PromotionState,
    /// Creation timestamp (Unix epoch seconds).
    pub created_at: u64,
    /// Owning session or user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl InstancePattern {
    /// The description, or the notation (else the component paths) when no
    /// description was given.
    #[must_use]
    pub fn intent(&self) -> String {
        if !self.description.trim().is_empty() {
            return self.description.clone();
        }
        self.notation
            .clone()
            .unwrap_or_else(|| self.components.join(" "))
    }

    /// Records one feedback event.
    ///
    /// Sets the latest feedback and bumps the matching counter. Never touches
    /// the promotion state.
    pub fn record_feedback(&mut self, feedback: Feedback) {
        self.feedback = feedback;
        match feedback {
            Feedback::Positive => self.positive_count = self.positive_count.saturating_add(1),
            Feedback::Negative => self.negative_count = self.negative_count.saturating_add(1),
            Feedback::Unset => {},
        }
    }
}

/// A retrieval hit from the pattern collection.
///
/// Carries the proven parameter values so a caller can merge them into a new
/// build.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch {
    /// Point ID (pattern ID or template point ID).
    pub id: String,
    /// Fused retrieval score.
    pub score: f64,
    /// Whether the hit is a raw pattern or a promoted template.
    pub point_type: PointType,
    /// Natural-language intent.
    pub description: String,
    /// Component paths in build order.
    pub components: Vec<String>,
    /// Instance values (patterns) or default values (templates).
    pub params: BTreeMap<String, serde_json::Value>,
    /// Latest feedback.
    pub feedback: Feedback,
    /// Promotion state.
    pub state: PromotionState,
}

/// How a variation differs from its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariationKind {
    /// A component swapped for a graph sibling.
    Structural,
    /// One parameter value perturbed.
    Parametric,
    /// One structural and one parametric change.
    Combined,
}

impl VariationKind {
    /// Returns the kind as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Structural => "structural",
            Self::Parametric => "parametric",
            Self::Combined => "combined",
        }
    }
}

/// A mutation of a stored pattern. Never mutates its parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternVariation {
    /// Variation ID (`<parent>-<kind>-<n>`).
    pub id: String,
    /// Parent pattern.
    pub parent_id: PatternId,
    /// Variation kind.
    pub kind: VariationKind,
    /// Resulting component paths.
    pub components: Vec<String>,
    /// Resulting parameter values.
    pub params: BTreeMap<String, serde_json::Value>,
    /// Resulting notation, when derivable.
    pub notation: Option<String>,
    /// Human-readable summary of the change.
    pub change: String,
}
