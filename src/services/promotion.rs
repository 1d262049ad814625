//! Feedback-driven promotion of patterns into templates.
//!
//! ```text
//! candidate ──(≥ template)──▶ template_eligible ──(≥ materialize)──▶ materialized
//!                             template point upserted                 artifact written
//! ```
//!
//! Transitions depend only on the positive-feedback count and only move
//! forward. Negative feedback never demotes; it gates retrieval instead.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::instrument;

use super::{MultiVectorRetriever, PointTexts};
use crate::index::IndexHandle;
use crate::models::{
    Feedback, InstancePattern, PatternId, PointType, PromotionState, Template, template_name,
};
use crate::storage::{Point, TemplateArtifactStore};
use crate::{Error, Result, current_timestamp};

/// Positive-feedback counts at which a pattern is promoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionThresholds {
    /// Count at which a template point is created.
    pub template: u32,
    /// Count at which the template is written as a durable artifact.
    pub materialize: u32,
}

impl Default for PromotionThresholds {
    fn default() -> Self {
        Self {
            template: 3,
            materialize: 10,
        }
    }
}

impl PromotionThresholds {
    /// Creates thresholds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] unless `1 <= template <= materialize`.
    pub fn new(template: u32, materialize: u32) -> Result<Self> {
        if template == 0 || template > materialize {
            return Err(Error::InvalidInput(format!(
                "promotion thresholds must satisfy 1 <= template ({template}) <= materialize ({materialize})"
            )));
        }
        Ok(Self {
            template,
            materialize,
        })
    }

    /// State implied by a positive-feedback count.
    #[must_use]
    pub const fn state_for(&self, positive_count: u32) -> PromotionState {
        PromotionState::for_positive_count(positive_count, self.template, self.materialize)
    }
}

/// Result of one promotion check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromotionOutcome {
    /// Pattern checked.
    pub pattern_id: PatternId,
    /// State before the check.
    pub previous: PromotionState,
    /// State after the check.
    pub state: PromotionState,
    /// Template the pattern maps to, once eligible.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Artifact written by this check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

impl PromotionOutcome {
    fn unchanged(pattern: &InstancePattern) -> Self {
        Self {
            pattern_id: pattern.id.clone(),
            previous: pattern.state,
            state: pattern.state,
            template: None,
            artifact: None,
        }
    }

    /// Returns true if the state advanced.
    #[must_use]
    pub fn promoted(&self) -> bool {
        self.state > self.previous
    }
}

/// How to revert the template point if the caller fails to persist.
#[derive(Debug)]
pub(crate) enum Undo {
    Restore(Box<Point>),
    Remove(String),
}

/// A promotion whose side effects are applied but not yet committed.
///
/// `pending` is the artifact to write once the pattern itself is saved.
#[derive(Debug)]
pub(crate) struct Applied {
    pub outcome: PromotionOutcome,
    pub undo: Option<Undo>,
    pub pending: Option<Template>,
}

impl Applied {
    pub(crate) fn unchanged(pattern: &InstancePattern) -> Self {
        Self {
            outcome: PromotionOutcome::unchanged(pattern),
            undo: None,
            pending: None,
        }
    }
}

/// Promotion state machine.
pub struct PromotionMachine {
    thresholds: PromotionThresholds,
    retriever: Arc<MultiVectorRetriever>,
    artifacts: Arc<dyn TemplateArtifactStore>,
    index: Arc<IndexHandle>,
}

impl PromotionMachine {
    /// Creates a state machine with default thresholds.
    #[must_use]
    pub fn new(
        retriever: Arc<MultiVectorRetriever>,
        artifacts: Arc<dyn TemplateArtifactStore>,
        index: Arc<IndexHandle>,
    ) -> Self {
        Self {
            thresholds: PromotionThresholds::default(),
            retriever,
            artifacts,
            index,
        }
    }

    /// Sets the thresholds.
    #[must_use]
    pub const fn with_thresholds(mut self, thresholds: PromotionThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Current thresholds.
    #[must_use]
    pub const fn thresholds(&self) -> PromotionThresholds {
        self.thresholds
    }

    /// Brings the pattern's state in line with its positive count.
    ///
    /// Writes the template point only. At materialization the artifact is
    /// returned as `pending`; the caller persists the pattern first, then
    /// calls [`Self::materialize`]. If either step fails the caller calls
    /// [`Self::rollback`]. On error nothing is written and the pattern is
    /// untouched.
    #[instrument(skip(self, pattern), fields(pattern_id = %pattern.id, positive = pattern.positive_count))]
    pub(crate) fn advance(&self, pattern: &mut InstancePattern) -> Result<Applied> {
        let previous = pattern.state;
        let target = previous.max(self.thresholds.state_for(pattern.positive_count));
        if target == previous {
            return Ok(Applied::unchanged(pattern));
        }

        let store = self.retriever.store();
        let name = template_name(&pattern.intent());
        let point_id = Template::point_id_for(&name);
        let existing = store
            .get(&point_id)
            .map_err(|e| Error::boundary("vector store", e))?;

        let now = current_timestamp();
        let mut template = match &existing {
            Some(point) => decode_template(&point.payload)?,
            None => {
                let index = self.index.load();
                let assignment = index.assign_params(&pattern.components, &pattern.params);
                Template::from_pattern(pattern, &assignment, now)
            },
        };

        if target == PromotionState::Materialized && template.materialized_at.is_none() {
            template.positive_count = template.positive_count.max(pattern.positive_count);
            template.materialized_at = Some(now);
        }

        let template_state = if template.materialized_at.is_some() {
            PromotionState::Materialized
        } else {
            PromotionState::TemplateEligible
        };
        let point = self.template_point(&template, template_state)?;
        let unchanged = existing
            .as_ref()
            .is_some_and(|p| p.payload == point.payload);
        let undo = if unchanged {
            None
        } else {
            store
                .upsert(std::slice::from_ref(&point))
                .map_err(|e| Error::boundary("vector store", e))?;
            Some(existing.map_or_else(
                || Undo::Remove(point_id.clone()),
                |p| Undo::Restore(Box::new(p)),
            ))
        };

        pattern.state = target;
        metrics::counter!("cardsmith_promotions_total", "state" => target.as_str()).increment(1);
        tracing::info!(
            from = previous.as_str(),
            to = target.as_str(),
            template = %template.name,
            "Promoted pattern"
        );

        let pending = (target == PromotionState::Materialized).then(|| template.clone());
        Ok(Applied {
            outcome: PromotionOutcome {
                pattern_id: pattern.id.clone(),
                previous,
                state: target,
                template: Some(template.name),
                artifact: None,
            },
            undo,
            pending,
        })
    }

    /// Writes the durable artifact of a materialized template.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BoundaryUnavailable`] if the artifact store fails.
    pub(crate) fn materialize(&self, template: &Template) -> Result<PathBuf> {
        let path = self
            .artifacts
            .write(template)
            .map_err(|e| Error::boundary("template artifacts", e))?;
        tracing::info!(template = %template.name, path = %path.display(), "Materialized template");
        Ok(path)
    }

    /// Reverts the template point written by [`Self::advance`].
    pub(crate) fn rollback(&self, undo: Undo) {
        let store = self.retriever.store();
        let result = match undo {
            Undo::Restore(point) => store.upsert(std::slice::from_ref(&*point)),
            Undo::Remove(id) => store.delete(&[id]).map(|_| ()),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to roll back template point");
        }
    }

    /// Builds the vector point of a template.
    ///
    /// # Errors
    ///
    /// Returns an error if the template cannot be encoded or embedded.
    pub fn template_point(&self, template: &Template, state: PromotionState) -> Result<Point> {
        let mut payload =
            serde_json::to_value(template).map_err(|e| Error::operation("encode_template", e))?;
        if let Value::Object(map) = &mut payload {
            map.insert("type".into(), PointType::Template.as_str().into());
            map.insert("state".into(), state.as_str().into());
            map.insert("feedback".into(), Feedback::Positive.as_str().into());
        }

        let defaults: Vec<String> = template
            .defaults
            .values()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        let texts = PointTexts {
            identity: format!("{} {}", template.description, template.name),
            content: format!("{} {}", template.description, defaults.join(" ")),
            structure: template
                .notation
                .clone()
                .unwrap_or_else(|| template.component_paths().join(" ")),
        };

        let mut point = Point::new(template.point_id(), payload);
        point.vectors = self.retriever.embed_point(&texts)?;
        Ok(point)
    }
}

/// Decodes a template from a template point payload.
///
/// # Errors
///
/// Returns an error if the payload is not a template.
pub fn decode_template(payload: &Value) -> Result<Template> {
    serde_json::from_value(payload.clone()).map_err(|e| Error::operation("decode_template", e))
}
