//! Explicit path-to-loader registry.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::instrument;

use super::{ComponentLibrary, LibraryManifest};
use crate::models::{ComponentDescriptor, EdgeOverride, ResolvedComponent};
use crate::{Error, Result};

/// Loads one component. Must be safe to call from any thread.
pub type ComponentLoader = Arc<dyn Fn() -> Result<ResolvedComponent> + Send + Sync>;

struct Entry {
    descriptor: ComponentDescriptor,
    loader: ComponentLoader,
}

/// In-process component library.
///
/// # Example
///
/// ```rust,ignore
/// use cardsmith::library::ComponentRegistry;
/// use cardsmith::models::{ComponentDescriptor, ParamSpec};
///
/// let mut registry = ComponentRegistry::new();
/// registry.register(ComponentDescriptor::class("card", "Button")
///     .with_param(ParamSpec::new("text", "str")))?;
/// ```
#[derive(Default)]
pub struct ComponentRegistry {
    entries: BTreeMap<String, Entry>,
    overrides: Vec<EdgeOverride>,
}

impl ComponentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a component whose resolution is its own descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the path is already registered.
    pub fn register(&mut self, descriptor: ComponentDescriptor) -> Result<()> {
        let resolved = ResolvedComponent::from(&descriptor);
        self.register_with(descriptor, Arc::new(move || Ok(resolved.clone())))
    }

    /// Registers a component with a custom loader.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the path is already registered.
    pub fn register_with(
        &mut self,
        descriptor: ComponentDescriptor,
        loader: ComponentLoader,
    ) -> Result<()> {
        let path = descriptor.path();
        if self.entries.contains_key(&path) {
            return Err(Error::InvalidInput(format!(
                "component registered twice: {path}"
            )));
        }
        self.entries.insert(path, Entry { descriptor, loader });
        Ok(())
    }

    /// Adds a manual containment edge.
    pub fn add_override(&mut self, edge: EdgeOverride) {
        self.overrides.push(edge);
    }

    /// Builds a registry from a manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest lists a path twice.
    pub fn from_manifest(manifest: LibraryManifest) -> Result<Self> {
        let mut registry = Self::new();
        for descriptor in manifest.components {
            registry.register(descriptor)?;
        }
        registry.overrides = manifest.overrides;
        Ok(registry)
    }

    /// Loads a JSON manifest file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or registered.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn load_manifest(path: impl AsRef<Path>) -> Result<Self> {
        let manifest = LibraryManifest::load(path.as_ref())?;
        let registry = Self::from_manifest(manifest)?;
        tracing::debug!(components = registry.len(), "Loaded library manifest");
        Ok(registry)
    }

    /// Number of registered components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("components", &self.entries.keys().collect::<Vec<_>>())
            .field("overrides", &self.overrides)
            .finish()
    }
}

impl ComponentLibrary for ComponentRegistry {
    fn describe(&self) -> Result<Vec<ComponentDescriptor>> {
        Ok(self
            .entries
            .values()
            .map(|e| e.descriptor.clone())
            .collect())
    }

    fn resolve_from_library(&self, path: &str) -> Result<ResolvedComponent> {
        let entry = self
            .entries
            .get(path)
            .ok_or_else(|| Error::ComponentNotFound(path.to_string()))?;
        (entry.loader)().map_err(|e| {
            tracing::warn!(path, error = %e, "Component loader failed");
            Error::ComponentNotFound(path.to_string())
        })
    }

    fn overrides(&self) -> Vec<EdgeOverride> {
        self.overrides.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EdgeKind, ParamSpec};

    #[test]
    fn test_register_and_resolve() {
        let mut registry = ComponentRegistry::new();
        registry
            .register(
                ComponentDescriptor::class("card", "Button")
                    .with_param(ParamSpec::new("text", "str")),
            )
            .unwrap();

        let resolved = registry.resolve_from_library("card.Button").unwrap();
        assert_eq!(resolved.name, "Button");
        assert_eq!(resolved.params.len(), 1);
        assert_eq!(registry.describe().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_path_is_component_not_found() {
        let registry = ComponentRegistry::new();
        let err = registry.resolve_from_library("card.Nope").unwrap_err();
        assert!(matches!(err, Error::ComponentNotFound(p) if p == "card.Nope"));
    }

    #[test]
    fn test_failing_loader_maps_to_component_not_found() {
        let mut registry = ComponentRegistry::new();
        registry
            .register_with(
                ComponentDescriptor::class("card", "Broken"),
                Arc::new(|| Err(Error::operation("import", "syntax error"))),
            )
            .unwrap();
        let err = registry.resolve_from_library("card.Broken").unwrap_err();
        assert!(matches!(err, Error::ComponentNotFound(_)));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = ComponentRegistry::new();
        registry
            .register(ComponentDescriptor::class("card", "Image"))
            .unwrap();
        assert!(
            registry
                .register(ComponentDescriptor::class("card", "Image"))
                .is_err()
        );
    }

    #[test]
    fn test_from_manifest_keeps_overrides() {
        let manifest = LibraryManifest {
            components: vec![
                ComponentDescriptor::class("card", "Section"),
                ComponentDescriptor::class("card", "Divider"),
            ],
            overrides: vec![EdgeOverride {
                parent: "Section".to_string(),
                child: "Divider".to_string(),
                kind: EdgeKind::Optional,
            }],
        };
        let registry = ComponentRegistry::from_manifest(manifest).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.overrides().len(), 1);
    }
}
