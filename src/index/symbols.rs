//! Notation symbol assignment.
//!
//! Well-known card classes get fixed symbols. Every other class draws from a
//! primary pool keyed by the initial of its class name; when that pool is used
//! up it draws from a secondary pool formed by prefixing the same symbols with
//! a per-module marker. Assignment is a pure function of the components seen
//! so far, so indexing in path order is reproducible.

use std::collections::{BTreeMap, HashSet};

use crate::models::{Component, ComponentKind};
use crate::{Error, Result};

/// Fixed symbols for well-known card classes.
pub const RESERVED: &[(&str, &str)] = &[
    ("Card", "ℂ"),
    ("Section", "§"),
    ("DecoratedText", "δ"),
    ("TextParagraph", "ʈ"),
    ("ButtonList", "Ƀ"),
    ("Button", "ᵬ"),
    ("Image", "ǐ"),
    ("Grid", "ǧ"),
    ("Columns", "¢"),
    ("Divider", "Đ"),
];

/// Primary pools keyed by class-name initial.
const POOLS: [&[&str]; 26] = [
    &["α", "Ά", "Ä", "Å", "Ā", "ȁ"],
    &["Ƀ", "ᵬ", "β", "ß", "Ɓ", "ƀ"],
    &["¢", "ç", "Ć", "ĉ", "Ȼ", "ȼ"],
    &["δ", "Đ", "Ď", "ď", "ɖ", "Δ"],
    &["ε", "Ê", "Ë", "Ē", "ȅ", "Ɛ"],
    &["ƒ", "Ƒ", "ϝ", "ꝼ", "ᵮ", "ꞙ"],
    &["ɢ", "Ĝ", "ğ", "Ģ", "ǥ", "Ǥ"],
    &["ħ", "Ĥ", "ȟ", "Ȟ", "ɦ", "Ή"],
    &["ɪ", "Î", "Ï", "Ī", "ȉ", "Ɨ"],
    &["ĵ", "Ĵ", "ɉ", "Ɉ", "ǰ", "ʝ"],
    &["κ", "Ķ", "ķ", "Ƙ", "ƙ", "ǩ"],
    &["λ", "Ł", "ł", "Ľ", "ľ", "Ƚ"],
    &["μ", "ɱ", "ᵯ", "ḿ", "Ṁ", "ṃ"],
    &["η", "ñ", "Ń", "ň", "Ɲ", "ŋ"],
    &["ο", "Ö", "Ø", "Ō", "ȍ", "Ɵ"],
    &["ρ", "Þ", "þ", "Ƥ", "ƥ", "ᵽ"],
    &["ϙ", "Ϙ", "ɋ", "Ɋ", "ʠ", "ꝗ"],
    &["ř", "Ŕ", "ŗ", "Ɍ", "ɍ", "ʀ"],
    &["§", "Ş", "ş", "Š", "Ŝ", "ȿ"],
    &["τ", "Ŧ", "ŧ", "Ť", "ť", "Ƭ"],
    &["υ", "Û", "Ü", "Ū", "ȕ", "Ʉ"],
    &["ν", "Ʋ", "ʋ", "Ṽ", "ṽ", "ⱱ"],
    &["ω", "Ŵ", "ŵ", "Ẁ", "ẃ", "Ⱳ"],
    &["χ", "Ẋ", "ẋ", "Ẍ", "ẍ", "ӿ"],
    &["ψ", "Ŷ", "ŷ", "Ÿ", "Ɏ", "ɏ"],
    &["ζ", "Ž", "ž", "Ż", "ż", "Ƶ"],
];

/// Module markers, one per initial of the module's last segment.
const MODULE_MARKERS: [&str; 26] = [
    "ᴬ", "ᴮ", "ꟲ", "ᴰ", "ᴱ", "ꟳ", "ᴳ", "ᴴ", "ᴵ", "ᴶ", "ᴷ", "ᴸ", "ᴹ", "ᴺ", "ᴼ", "ᴾ", "ꟴ", "ᴿ",
    "ˢ", "ᵀ", "ᵁ", "ⱽ", "ᵂ", "ˣ", "ʸ", "ᶻ",
];

fn letter_index(text: &str) -> usize {
    text.chars()
        .find(char::is_ascii_alphabetic)
        .map_or(23, |c| (c.to_ascii_uppercase() as usize) - ('A' as usize))
}

fn reserved_symbol(name: &str) -> Option<&'static str> {
    RESERVED.iter().find(|(n, _)| *n == name).map(|(_, s)| *s)
}

fn is_reserved_for_other(symbol: &str, name: &str) -> bool {
    RESERVED.iter().any(|(n, s)| *s == symbol && *n != name)
}

/// Bidirectional symbol table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    by_path: BTreeMap<String, String>,
    by_symbol: BTreeMap<String, String>,
    used: HashSet<String>,
}

impl SymbolTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns (or returns the existing) symbol for a class component.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for non-class components and
    /// [`Error::SymbolExhausted`] when both pools are used up.
    pub fn assign(&mut self, component: &Component) -> Result<String> {
        if component.kind != ComponentKind::Class {
            return Err(Error::InvalidInput(format!(
                "only classes receive symbols: {} is a {}",
                component.path, component.kind
            )));
        }
        if let Some(existing) = self.by_path.get(&component.path) {
            return Ok(existing.clone());
        }

        let symbol = self
            .pick(&component.module, &component.name)
            .ok_or_else(|| Error::SymbolExhausted {
                module: component.module.clone(),
                name: component.name.clone(),
            })?;

        self.used.insert(symbol.clone());
        self.by_path.insert(component.path.clone(), symbol.clone());
        self.by_symbol
            .insert(symbol.clone(), component.path.clone());
        Ok(symbol)
    }

    fn pick(&self, module: &str, name: &str) -> Option<String> {
        if let Some(symbol) = reserved_symbol(name)
            && !self.used.contains(symbol)
        {
            return Some(symbol.to_string());
        }

        let pool = POOLS[letter_index(name)];
        if let Some(symbol) = pool
            .iter()
            .find(|s| !self.used.contains(**s) && !is_reserved_for_other(s, name))
        {
            return Some((*symbol).to_string());
        }

        let segment = module.rsplit('.').next().unwrap_or(module);
        let marker = MODULE_MARKERS[letter_index(segment)];
        pool.iter()
            .map(|s| format!("{marker}{s}"))
            .find(|s| !self.used.contains(s))
    }

    /// Symbol for a component path.
    #[must_use]
    pub fn symbol_for(&self, path: &str) -> Option<&str> {
        self.by_path.get(path).map(String::as_str)
    }

    /// Component path for a symbol.
    #[must_use]
    pub fn path_for(&self, symbol: &str) -> Option<&str> {
        self.by_symbol.get(symbol).map(String::as_str)
    }

    /// Number of assigned symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    /// Returns true if no symbol is assigned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Iterates `(path, symbol)` pairs in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_path.iter().map(|(p, s)| (p.as_str(), s.as_str()))
    }
}
