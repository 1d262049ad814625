//! Pattern variations.
//!
//! Variations are derived, never written back: the parent pattern is borrowed
//! immutably and every variation owns fresh copies of its components and
//! parameters.
//!
//! - **Structural**: one component swapped for a graph sibling (another
//!   component with a common container). The swap must still nest.
//! - **Parametric**: one parameter perturbed according to its declared type.
//! - **Combined**: one structural and one parametric change.

use serde_json::{Number, Value};
use std::sync::Arc;
use tracing::instrument;

use crate::dsl;
use crate::index::{IndexHandle, LibraryIndex};
use crate::models::{InstancePattern, ParamType, PatternVariation, VariationKind};

/// Default maximum variations per kind.
pub const DEFAULT_MAX_VARIATIONS: usize = 5;

/// Relative jitter applied to numeric parameters.
const NUMERIC_JITTER: f64 = 0.2;

/// Texts shorter than this are not truncated.
const MIN_TRUNCATE_WORDS: usize = 3;

/// Word substitutions for text parameters.
const SYNONYMS: &[(&str, &str)] = &[
    ("status", "state"),
    ("error", "failure"),
    ("success", "done"),
    ("warning", "caution"),
    ("update", "change"),
    ("start", "begin"),
    ("stop", "halt"),
    ("open", "view"),
    ("delete", "remove"),
    ("create", "add"),
    ("summary", "overview"),
    ("details", "info"),
    ("report", "digest"),
    ("alert", "notice"),
    ("new", "fresh"),
];

/// A single parameter change.
struct ParamChange {
    name: String,
    value: Value,
    change: String,
}

/// Generates structural, parametric and combined variations.
pub struct VariationGenerator {
    index: Arc<IndexHandle>,
}

impl VariationGenerator {
    /// Creates a generator over the current index snapshot.
    #[must_use]
    pub const fn new(index: Arc<IndexHandle>) -> Self {
        Self { index }
    }

    /// Swaps one component at a time for a graph sibling.
    ///
    /// Patterns with notation only yield swaps that still nest; flat
    /// patterns yield every swap.
    #[must_use]
    #[instrument(skip(self, pattern), fields(pattern_id = %pattern.id))]
    pub fn generate_structural(
        &self,
        pattern: &InstancePattern,
        max: usize,
    ) -> Vec<PatternVariation> {
        let index = self.index.load();
        structural_swaps(&index, pattern)
            .into_iter()
            .take(max)
            .enumerate()
            .map(|(n, swap)| PatternVariation {
                id: variation_id(pattern, VariationKind::Structural, n + 1),
                parent_id: pattern.id.clone(),
                kind: VariationKind::Structural,
                components: swap.components,
                params: pattern.params.clone(),
                notation: swap.notation,
                change: swap.change,
            })
            .collect()
    }

    /// Perturbs one parameter at a time.
    #[must_use]
    #[instrument(skip(self, pattern), fields(pattern_id = %pattern.id))]
    pub fn generate_parametric(
        &self,
        pattern: &InstancePattern,
        max: usize,
    ) -> Vec<PatternVariation> {
        let index = self.index.load();
        param_changes(&index, pattern)
            .into_iter()
            .take(max)
            .enumerate()
            .map(|(n, change)| {
                let mut params = pattern.params.clone();
                params.insert(change.name, change.value);
                PatternVariation {
                    id: variation_id(pattern, VariationKind::Parametric, n + 1),
                    parent_id: pattern.id.clone(),
                    kind: VariationKind::Parametric,
                    components: pattern.components.clone(),
                    params,
                    notation: pattern.notation.clone(),
                    change: change.change,
                }
            })
            .collect()
    }

    /// Pairs structural swaps with parameter changes.
    ///
    /// The i-th swap is combined with the i-th parameter change, cycling
    /// through changes when there are fewer of them.
    #[must_use]
    #[instrument(skip(self, pattern), fields(pattern_id = %pattern.id))]
    pub fn generate_combined(&self, pattern: &InstancePattern, max: usize) -> Vec<PatternVariation> {
        let index = self.index.load();
        let swaps = structural_swaps(&index, pattern);
        let changes = param_changes(&index, pattern);
        if swaps.is_empty() || changes.is_empty() {
            return Vec::new();
        }

        swaps
            .into_iter()
            .take(max)
            .enumerate()
            .map(|(n, swap)| {
                let change = &changes[n % changes.len()];
                let mut params = pattern.params.clone();
                params.insert(change.name.clone(), change.value.clone());
                PatternVariation {
                    id: variation_id(pattern, VariationKind::Combined, n + 1),
                    parent_id: pattern.id.clone(),
                    kind: VariationKind::Combined,
                    components: swap.components,
                    params,
                    notation: swap.notation,
                    change: format!("{}; {}", swap.change, change.change),
                }
            })
            .collect()
    }

    /// Generates variations of one kind.
    #[must_use]
    pub fn generate(
        &self,
        pattern: &InstancePattern,
        kind: VariationKind,
        max: usize,
    ) -> Vec<PatternVariation> {
        match kind {
            VariationKind::Structural => self.generate_structural(pattern, max),
            VariationKind::Parametric => self.generate_parametric(pattern, max),
            VariationKind::Combined => self.generate_combined(pattern, max),
        }
    }
}

fn variation_id(pattern: &InstancePattern, kind: VariationKind, n: usize) -> String {
    format!("{}-{}-{n}", pattern.id, kind.as_str())
}

struct Swap {
    components: Vec<String>,
    notation: Option<String>,
    change: String,
}

fn structural_swaps(index: &LibraryIndex, pattern: &InstancePattern) -> Vec<Swap> {
    let mut swaps = Vec::new();
    for (position, path) in pattern.components.iter().enumerate() {
        for sibling in index.graph().siblings(path) {
            let mut components = pattern.components.clone();
            components[position].clone_from(&sibling);

            let notation = match dsl::build(index, &components) {
                Ok(tree) => Some(tree.to_string()),
                Err(_) if pattern.notation.is_some() => continue,
                Err(_) => None,
            };
            swaps.push(Swap {
                change: format!("swapped {path} for {sibling} at position {position}"),
                components,
                notation,
            });
        }
    }
    swaps
}

fn param_changes(index: &LibraryIndex, pattern: &InstancePattern) -> Vec<ParamChange> {
    let mut changes = Vec::new();
    for (name, value) in &pattern.params {
        let spec = pattern
            .components
            .iter()
            .filter_map(|path| index.component(path))
            .find_map(|c| c.param(name));
        let param_type = spec.map_or_else(|| inferred_type(value), |s| s.param_type());

        let mut push = |value: Value, change: String| {
            changes.push(ParamChange {
                name: name.clone(),
                value,
                change,
            });
        };

        match (param_type, value) {
            (ParamType::Enum, Value::String(current)) => {
                let choices = spec.map(|s| s.enum_choices()).unwrap_or_default();
                for choice in choices.into_iter().filter(|c| c != current) {
                    push(
                        Value::String(choice.clone()),
                        format!("{name}: {current} -> {choice}"),
                    );
                }
            },
            (ParamType::Boolean, Value::Bool(b)) => {
                push(Value::Bool(!b), format!("{name}: {b} -> {}", !b));
            },
            (ParamType::Integer | ParamType::Float, Value::Number(n)) => {
                for jittered in jitter(n, param_type == ParamType::Integer) {
                    push(Value::Number(jittered.clone()), format!("{name}: {n} -> {jittered}"));
                }
            },
            (_, Value::String(text)) => {
                if let Some(swapped) = synonym_swap(text) {
                    push(
                        Value::String(swapped.clone()),
                        format!("{name}: synonym '{swapped}'"),
                    );
                }
                if let Some(short) = truncate_words(text) {
                    push(
                        Value::String(short.clone()),
                        format!("{name}: truncated to '{short}'"),
                    );
                }
            },
            _ => {},
        }
    }
    changes
}

fn inferred_type(value: &Value) -> ParamType {
    match value {
        Value::Bool(_) => ParamType::Boolean,
        Value::Number(n) if n.is_i64() || n.is_u64() => ParamType::Integer,
        Value::Number(_) => ParamType::Float,
        Value::String(_) => ParamType::Text,
        _ => ParamType::Other,
    }
}

/// Values `NUMERIC_JITTER` above and below `n`; integers move by at least 1.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn jitter(n: &Number, integer: bool) -> Vec<Number> {
    if integer {
        let Some(v) = n.as_i64() else {
            return Vec::new();
        };
        let delta = ((v as f64).abs() * NUMERIC_JITTER).round().max(1.0) as i64;
        [v.saturating_add(delta), v.saturating_sub(delta)]
            .into_iter()
            .map(Number::from)
            .collect()
    } else {
        let Some(v) = n.as_f64() else {
            return Vec::new();
        };
        let delta = if v == 0.0 { NUMERIC_JITTER } else { v.abs() * NUMERIC_JITTER };
        [v + delta, v - delta]
            .into_iter()
            .filter_map(Number::from_f64)
            .collect()
    }
}

/// Replaces the first word that has a synonym, keeping its capitalisation.
fn synonym_swap(text: &str) -> Option<String> {
    let words: Vec<&str> = text.split(' ').collect();
    for (i, word) in words.iter().enumerate() {
        let lower = word.to_lowercase();
        let replacement = SYNONYMS.iter().find_map(|(a, b)| {
            if lower == *a {
                Some(*b)
            } else if lower == *b {
                Some(*a)
            } else {
                None
            }
        });
        if let Some(replacement) = replacement {
            let replacement = if word.chars().next().is_some_and(char::is_uppercase) {
                let mut chars = replacement.chars();
                chars
                    .next()
                    .map(|c| c.to_uppercase().chain(chars).collect())
                    .unwrap_or_default()
            } else {
                replacement.to_string()
            };
            let mut out = words.clone();
            out[i] = replacement.as_str();
            return Some(out.join(" "));
        }
    }
    None
}

/// Keeps the first half of the words.
fn truncate_words(text: &str) -> Option<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() < MIN_TRUNCATE_WORDS {
        return None;
    }
    Some(words[..words.len().div_ceil(2)].join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Indexer;
    use crate::models::{ComponentDescriptor, Feedback, ParamSpec, PatternId, PromotionState};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn handle() -> Arc<IndexHandle> {
        let library = vec![
            ComponentDescriptor::class("card", "Section").with_param(ParamSpec::new(
                "widgets",
                "List[Union[DecoratedText, TextParagraph, Image]]",
            )),
            ComponentDescriptor::class("card", "DecoratedText")
                .with_param(ParamSpec::new("text", "str"))
                .with_param(ParamSpec::new("wrap", "bool")),
            ComponentDescriptor::class("card", "TextParagraph")
                .with_param(ParamSpec::new("text", "str")),
            ComponentDescriptor::class("card", "Image")
                .with_param(ParamSpec::new("width", "int"))
                .with_param(
                    ParamSpec::new("crop", "Literal['square', 'circle', 'none']"),
                ),
        ];
        let (index, _) = Indexer::build(&library, &[]).unwrap();
        Arc::new(IndexHandle::new(index))
    }

    fn pattern() -> InstancePattern {
        InstancePattern {
            id: PatternId::new("pat_1"),
            components: vec!["card.Section".to_string(), "card.DecoratedText".to_string()],
            params: BTreeMap::from([
                ("text".to_string(), json!("Deployment status is green")),
                ("wrap".to_string(), json!(true)),
            ]),
            description: "deployment status".to_string(),
            notation: Some("§[δ]".to_string()),
            feedback: Feedback::Positive,
            positive_count: 1,
            negative_count: 0,
            state: PromotionState::Candidate,
            created_at: 0,
            owner: None,
        }
    }

    #[test]
    fn test_structural_swaps_siblings() {
        let generator = VariationGenerator::new(handle());
        let parent = pattern();
        let variations = generator.generate_structural(&parent, 10);

        let swapped: Vec<&str> = variations.iter().map(|v| v.components[1].as_str()).collect();
        assert_eq!(swapped, vec!["card.Image", "card.TextParagraph"]);
        assert_eq!(variations[0].id, "pat_1-structural-1");
        assert_eq!(variations[0].notation.as_deref(), Some("§[ǐ]"));
        assert_eq!(parent, pattern());
    }

    #[test]
    fn test_parametric_by_type() {
        let generator = VariationGenerator::new(handle());
        let variations = generator.generate_parametric(&pattern(), 10);

        let texts: Vec<&Value> = variations
            .iter()
            .filter(|v| v.change.starts_with("text"))
            .map(|v| &v.params["text"])
            .collect();
        assert!(texts.contains(&&json!("Deployment state is green")));
        assert!(texts.contains(&&json!("Deployment status")));

        let wrap = variations
            .iter()
            .find(|v| v.change.starts_with("wrap"))
            .unwrap();
        assert_eq!(wrap.params["wrap"], json!(false));
        assert_eq!(wrap.params["text"], json!("Deployment status is green"));
        assert!(variations.iter().all(|v| v.kind == VariationKind::Parametric));
    }

    #[test]
    fn test_numeric_and_enum_perturbation() {
        let generator = VariationGenerator::new(handle());
        let mut parent = pattern();
        parent.components = vec!["card.Image".to_string()];
        parent.notation = None;
        parent.params = BTreeMap::from([
            ("width".to_string(), json!(100)),
            ("crop".to_string(), json!("square")),
        ]);

        let variations = generator.generate_parametric(&parent, 10);
        let values: Vec<&Value> = variations.iter().flat_map(|v| v.params.values()).collect();
        assert!(values.contains(&&json!(120)));
        assert!(values.contains(&&json!(80)));
        assert!(values.contains(&&json!("circle")));
        assert!(values.contains(&&json!("none")));
    }

    #[test]
    fn test_combined_applies_one_of_each() {
        let generator = VariationGenerator::new(handle());
        let parent = pattern();
        let variations = generator.generate_combined(&parent, 1);
        assert_eq!(variations.len(), 1);
        let v = &variations[0];
        assert_eq!(v.id, "pat_1-combined-1");
        assert_ne!(v.components, parent.components);
        assert_ne!(v.params, parent.params);
    }

    #[test]
    fn test_max_caps_output() {
        let generator = VariationGenerator::new(handle());
        assert_eq!(generator.generate_structural(&pattern(), 1).len(), 1);
        assert!(generator.generate_parametric(&pattern(), 0).is_empty());
    }

    #[test]
    fn test_helpers() {
        assert_eq!(synonym_swap("Error report"), Some("Failure report".to_string()));
        assert_eq!(synonym_swap("nothing here"), None);
        assert_eq!(truncate_words("a b c d e"), Some("a b c".to_string()));
        assert_eq!(truncate_words("a b"), None);
        assert_eq!(jitter(&Number::from(1), true), vec![Number::from(2), Number::from(0)]);
    }
}
