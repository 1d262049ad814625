//! Component types produced by library introspection.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

macro_rules! lazy_regex {
    ($pattern:expr) => {
        LazyLock::new(|| Regex::new($pattern).unwrap_or_else(|_| unreachable!()))
    };
}

/// Quoted members of a `Literal[...]` type hint.
static LITERAL_MEMBER: LazyLock<Regex> = lazy_regex!(r#"["']([^"']+)["']"#);

/// What kind of symbol an introspected component is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    /// A class; the only kind that receives a notation symbol.
    Class,
    /// A free function.
    Function,
    /// A module-level variable or constant.
    Variable,
}

impl ComponentKind {
    /// Returns the kind as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Function => "function",
            Self::Variable => "variable",
        }
    }

    /// Parses a kind string (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "class" => Some(Self::Class),
            "function" | "fn" => Some(Self::Function),
            "variable" | "var" | "constant" => Some(Self::Variable),
            _ => None,
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared type category of a parameter, derived from its type hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    /// Free text.
    Text,
    /// Whole number.
    Integer,
    /// Floating point number.
    Float,
    /// True/false flag.
    Boolean,
    /// One of a closed set of string values.
    Enum,
    /// Another component (containment).
    Component,
    /// Anything else.
    Other,
}

/// A declared constructor parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Parameter name.
    pub name: String,
    /// Raw type hint as written in the library (`str`, `List[Button]`, ...).
    #[serde(default)]
    pub type_hint: String,
    /// Default value, if declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Allowed values for enum-like parameters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

impl ParamSpec {
    /// Creates a parameter with the given name and type hint.
    #[must_use]
    pub fn new(name: impl Into<String>, type_hint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_hint: type_hint.into(),
            default: None,
            choices: Vec::new(),
        }
    }

    /// Sets explicit enum choices.
    #[must_use]
    pub fn with_choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Returns the allowed values: explicit choices, else `Literal[...]` members.
    #[must_use]
    pub fn enum_choices(&self) -> Vec<String> {
        if !self.choices.is_empty() {
            return self.choices.clone();
        }
        if self.type_hint.trim_start().starts_with("Literal[") {
            return LITERAL_MEMBER
                .captures_iter(&self.type_hint)
                .map(|c| c[1].to_string())
                .collect();
        }
        Vec::new()
    }

    /// Classifies the type hint.
    #[must_use]
    pub fn param_type(&self) -> ParamType {
        if !self.enum_choices().is_empty() {
            return ParamType::Enum;
        }
        let hint = self.type_hint.trim();
        let base = hint
            .strip_prefix("Optional[")
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(hint)
            .trim();
        match base.to_lowercase().as_str() {
            "str" | "string" => ParamType::Text,
            "int" | "integer" => ParamType::Integer,
            "float" | "number" => ParamType::Float,
            "bool" | "boolean" => ParamType::Boolean,
            _ if base.starts_with(|c: char| c.is_ascii_uppercase()) => ParamType::Component,
            _ => ParamType::Other,
        }
    }
}

/// A component as reported by library introspection.
///
/// This is the input of the indexing pipeline and the unit of the JSON
/// library manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    /// Dotted module path (`card_framework.v2.widgets`).
    pub module: String,
    /// Class, function or variable name.
    pub name: String,
    /// Component kind.
    #[serde(default = "default_kind")]
    pub kind: ComponentKind,
    /// Documentation text.
    #[serde(default)]
    pub docs: String,
    /// Declared parameters, in declaration order.
    #[serde(default)]
    pub params: Vec<ParamSpec>,
}

const fn default_kind() -> ComponentKind {
    ComponentKind::Class
}

impl ComponentDescriptor {
    /// Creates a class descriptor.
    #[must_use]
    pub fn class(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            kind: ComponentKind::Class,
            docs: String::new(),
            params: Vec::new(),
        }
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    /// Sets the documentation text.
    #[must_use]
    pub fn with_docs(mut self, docs: impl Into<String>) -> Self {
        self.docs = docs.into();
        self
    }

    /// Sets the kind.
    #[must_use]
    pub const fn with_kind(mut self, kind: ComponentKind) -> Self {
        self.kind = kind;
        self
    }

    /// Fully-qualified path (`module.name`, or just `name` for a root module).
    #[must_use]
    pub fn path(&self) -> String {
        if self.module.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.module, self.name)
        }
    }
}

/// An indexed component.
///
/// Created during indexing and immutable afterwards; re-indexing replaces the
/// whole set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Fully-qualified path; the unique key.
    pub path: String,
    /// Display name.
    pub name: String,
    /// Dotted module path.
    pub module: String,
    /// Component kind.
    pub kind: ComponentKind,
    /// Assigned notation symbol (classes only).
    pub symbol: Option<String>,
    /// Documentation text.
    pub docs: String,
    /// Declared parameters.
    pub params: Vec<ParamSpec>,
}

impl Component {
    /// Builds an unsymbolled component from its descriptor.
    #[must_use]
    pub fn from_descriptor(descriptor: &ComponentDescriptor) -> Self {
        Self {
            path: descriptor.path(),
            name: descriptor.name.clone(),
            module: descriptor.module.clone(),
            kind: descriptor.kind,
            symbol: None,
            docs: descriptor.docs.clone(),
            params: descriptor.params.clone(),
        }
    }

    /// Returns the declared parameter with the given name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Returns true if the component declares the parameter.
    #[must_use]
    pub fn declares(&self, name: &str) -> bool {
        self.param(name).is_some()
    }
}

/// A component loaded from the library, as handed to the render boundary.
///
/// This is the value stored in every resolution cache tier, so it must be
/// serializable for the on-disk tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedComponent {
    /// Fully-qualified path.
    pub path: String,
    /// Display name.
    pub name: String,
    /// Component kind.
    pub kind: ComponentKind,
    /// Documentation text.
    #[serde(default)]
    pub docs: String,
    /// Declared parameters.
    #[serde(default)]
    pub params: Vec<ParamSpec>,
    /// Declared default values by parameter name.
    #[serde(default)]
    pub defaults: BTreeMap<String, serde_json::Value>,
}

impl From<&ComponentDescriptor> for ResolvedComponent {
    fn from(descriptor: &ComponentDescriptor) -> Self {
        let defaults = descriptor
            .params
            .iter()
            .filter_map(|p| p.default.clone().map(|v| (p.name.clone(), v)))
            .collect();
        Self {
            path: descriptor.path(),
            name: descriptor.name.clone(),
            kind: descriptor.kind,
            docs: descriptor.docs.clone(),
            params: descriptor.params.clone(),
            defaults,
        }
    }
}

/// How a container holds a containee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// Exactly one, required.
    Direct,
    /// Zero or one.
    Optional,
    /// Zero or more.
    Repeated,
}

impl EdgeKind {
    /// Returns the kind as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Optional => "optional",
            Self::Repeated => "repeated",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A "may-contain" edge between two component types.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationshipEdge {
    /// Container path.
    pub parent: String,
    /// Containee path.
    pub child: String,
    /// Edge kind.
    pub kind: EdgeKind,
}

/// A manually declared edge, applied after type-hint analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeOverride {
    /// Container path or class name.
    pub parent: String,
    /// Containee path or class name.
    pub child: String,
    /// Edge kind.
    #[serde(default = "default_edge_kind")]
    pub kind: EdgeKind,
}

const fn default_edge_kind() -> EdgeKind {
    EdgeKind::Direct
}

/// Splits `ButtonList`, `decorated_text` or `card.v2.Grid` into lowercase words.
#[must_use]
pub fn split_identifier(identifier: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for c in identifier.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}
