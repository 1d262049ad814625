//! Component library boundary.
//!
//! The library is the source of truth for components: [`ComponentLibrary::describe`]
//! feeds indexing and [`ComponentLibrary::resolve_from_library`] is the slowest
//! tier of the resolution cache.
//!
//! Components are resolved through an explicit [`ComponentRegistry`] (path to
//! loader) rather than by importing modules at run time.

mod manifest;
mod registry;

pub use manifest::LibraryManifest;
pub use registry::{ComponentLoader, ComponentRegistry};

use crate::Result;
use crate::models::{ComponentDescriptor, EdgeOverride, ResolvedComponent};

/// Trait for component library backends.
pub trait ComponentLibrary: Send + Sync {
    /// Lists every component the library exposes.
    ///
    /// # Errors
    ///
    /// Returns an error if introspection fails.
    fn describe(&self) -> Result<Vec<ComponentDescriptor>>;

    /// Loads a component by fully-qualified path.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ComponentNotFound`] if the path is unknown or
    /// fails to load.
    fn resolve_from_library(&self, path: &str) -> Result<ResolvedComponent>;

    /// Manually declared containment edges.
    fn overrides(&self) -> Vec<EdgeOverride> {
        Vec::new()
    }
}
