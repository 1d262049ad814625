//! Promoted templates.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::{InstancePattern, PatternId};
use crate::{Error, Result};

macro_rules! lazy_regex {
    ($pattern:expr) => {
        LazyLock::new(|| Regex::new($pattern).unwrap_or_else(|_| unreachable!()))
    };
}

/// Placeholder syntax: `${name}`.
static PLACEHOLDER: LazyLock<Regex> = lazy_regex!(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}");

/// Longest slug kept in a template name.
const MAX_SLUG_LEN: usize = 48;

/// One component slot of a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateComponent {
    /// Component path.
    pub path: String,
    /// Parameter templates by parameter name (`"${title}"`, `"Hello ${name}"`).
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// A usage pattern promoted into a reusable template.
///
/// Created once, when the source pattern crosses the template threshold. The
/// only later change is the materialize transition, which records the count
/// and time at which the durable artifact was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Template name, derived from the source description.
    pub name: String,
    /// Source description.
    pub description: String,
    /// Component slots in build order.
    pub components: Vec<TemplateComponent>,
    /// Default placeholder values, taken from the source pattern.
    #[serde(default)]
    pub defaults: BTreeMap<String, Value>,
    /// Notation of the source pattern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notation: Option<String>,
    /// Pattern the template was promoted from.
    pub source_pattern: PatternId,
    /// Positive-feedback count at promotion (updated on materialization).
    pub positive_count: u32,
    /// Promotion timestamp (Unix epoch seconds).
    pub promoted_at: u64,
    /// Materialization timestamp, once written as a durable artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub materialized_at: Option<u64>,
}

impl Template {
    /// Builds a template from a pattern.
    ///
    /// `assignment[i]` lists the parameter names owned by the i-th component;
    /// each becomes a `${name}` placeholder with the pattern's value as default.
    #[must_use]
    pub fn from_pattern(
        pattern: &InstancePattern,
        assignment: &[Vec<String>],
        promoted_at: u64,
    ) -> Self {
        let components = pattern
            .components
            .iter()
            .enumerate()
            .map(|(i, path)| TemplateComponent {
                path: path.clone(),
                params: assignment
                    .get(i)
                    .map(|names| {
                        names
                            .iter()
                            .map(|n| (n.clone(), placeholder(n)))
                            .collect()
                    })
                    .unwrap_or_default(),
            })
            .collect();

        let intent = pattern.intent();
        Self {
            name: template_name(&intent),
            description: intent,
            components,
            defaults: pattern.params.clone(),
            notation: pattern.notation.clone(),
            source_pattern: pattern.id.clone(),
            positive_count: pattern.positive_count,
            promoted_at,
            materialized_at: None,
        }
    }

    /// Point ID of the template in the vector collection.
    #[must_use]
    pub fn point_id(&self) -> String {
        Self::point_id_for(&self.name)
    }

    /// Point ID for a template name.
    #[must_use]
    pub fn point_id_for(name: &str) -> String {
        format!("tpl_{name}")
    }

    /// Component paths in build order.
    #[must_use]
    pub fn component_paths(&self) -> Vec<String> {
        self.components.iter().map(|c| c.path.clone()).collect()
    }

    /// Fills placeholders with `values`, falling back to defaults.
    ///
    /// A parameter template that is exactly one placeholder keeps the value's
    /// JSON type; embedded placeholders are substituted as text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a placeholder has neither a value
    /// nor a default.
    pub fn instantiate(
        &self,
        values: &BTreeMap<String, Value>,
    ) -> Result<Vec<(String, BTreeMap<String, Value>)>> {
        let lookup = |name: &str| -> Result<Value> {
            values
                .get(name)
                .or_else(|| self.defaults.get(name))
                .cloned()
                .ok_or_else(|| {
                    Error::InvalidInput(format!(
                        "template '{}' has no value for ${{{name}}}",
                        self.name
                    ))
                })
        };

        let mut out = Vec::with_capacity(self.components.len());
        for component in &self.components {
            let mut params = BTreeMap::new();
            for (param, template) in &component.params {
                let value = match whole_placeholder(template) {
                    Some(name) => lookup(name)?,
                    None => {
                        let mut text = String::with_capacity(template.len());
                        let mut last = 0;
                        for caps in PLACEHOLDER.captures_iter(template) {
                            let (Some(m), Some(name)) = (caps.get(0), caps.get(1)) else {
                                continue;
                            };
                            text.push_str(&template[last..m.start()]);
                            match lookup(name.as_str())? {
                                Value::String(s) => text.push_str(&s),
                                other => text.push_str(&other.to_string()),
                            }
                            last = m.end();
                        }
                        text.push_str(&template[last..]);
                        Value::String(text)
                    },
                };
                params.insert(param.clone(), value);
            }
            out.push((component.path.clone(), params));
        }
        Ok(out)
    }
}

/// Formats a placeholder for a parameter name.
#[must_use]
pub fn placeholder(name: &str) -> String {
    format!("${{{name}}}")
}

/// Lists placeholder names in order of appearance.
#[must_use]
pub fn placeholders(text: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect()
}

fn whole_placeholder(text: &str) -> Option<&str> {
    let caps = PLACEHOLDER.captures(text)?;
    let whole = caps.get(0)?;
    if whole.start() == 0 && whole.end() == text.len() {
        caps.get(1).map(|m| m.as_str())
    } else {
        None
    }
}

/// Derives a template name from its source description.
///
/// Deterministic: a lowercase slug of the description plus the first eight
/// hex digits of its SHA-256, so equal descriptions always share a name.
#[must_use]
pub fn template_name(description: &str) -> String {
    let mut slug = String::new();
    for word in description
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let word = word.to_lowercase();
        if slug.len() + word.len() + 1 > MAX_SLUG_LEN {
            break;
        }
        if !slug.is_empty() {
            slug.push('_');
        }
        slug.push_str(&word);
    }
    if slug.is_empty() {
        slug.push_str("template");
    }

    let digest = Sha256::digest(description.trim().as_bytes());
    format!("{slug}_{}", &hex::encode(digest)[..8])
}
