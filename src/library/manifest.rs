//! JSON library manifest.
//!
//! ```json
//! {
//!   "components": [
//!     {"module": "card", "name": "Section", "params": [
//!       {"name": "widgets", "type_hint": "List[DecoratedText]"}
//!     ]}
//!   ],
//!   "overrides": [{"parent": "Section", "child": "Divider", "kind": "optional"}]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::models::{ComponentDescriptor, EdgeOverride};
use crate::{Error, Result};

/// Serialized description of a component library.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryManifest {
    /// Component descriptors.
    #[serde(default)]
    pub components: Vec<ComponentDescriptor>,
    /// Manual containment edges.
    #[serde(default)]
    pub overrides: Vec<EdgeOverride>,
}

impl LibraryManifest {
    /// Parses a manifest from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the JSON is malformed.
    pub fn parse(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::InvalidInput(format!("invalid library manifest: {e}")))
    }

    /// Loads a manifest file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|e| Error::operation("read_manifest", e))?;
        Self::parse(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ComponentKind, EdgeKind};

    #[test]
    fn test_parse_with_defaults() {
        let manifest = LibraryManifest::parse(
            r#"{
                "components": [
                    {"module": "card", "name": "Section", "docs": "Groups widgets",
                     "params": [{"name": "widgets", "type_hint": "List[Widget]"}]},
                    {"module": "card", "name": "build_card", "kind": "function"}
                ],
                "overrides": [{"parent": "Section", "child": "Divider"}]
            }"#,
        )
        .unwrap();

        assert_eq!(manifest.components.len(), 2);
        assert_eq!(manifest.components[0].kind, ComponentKind::Class);
        assert_eq!(manifest.components[1].kind, ComponentKind::Function);
        assert_eq!(manifest.overrides[0].kind, EdgeKind::Direct);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            LibraryManifest::parse("not json"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_empty_object_is_empty_manifest() {
        assert_eq!(LibraryManifest::parse("{}").unwrap(), LibraryManifest::default());
    }
}
