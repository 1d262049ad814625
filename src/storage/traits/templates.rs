//! Durable template artifact trait.

use std::path::PathBuf;

use crate::Result;
use crate::models::Template;

/// Durable storage for materialized templates, keyed by template name.
pub trait TemplateArtifactStore: Send + Sync {
    /// Writes the artifact for a template.
    ///
    /// Idempotent: writing the same template twice leaves identical content.
    /// The write is atomic; a failure never leaves a partial artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if the artifact cannot be written.
    fn write(&self, template: &Template) -> Result<PathBuf>;

    /// Loads a template by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the artifact exists but cannot be read.
    fn load(&self, name: &str) -> Result<Option<Template>>;

    /// Lists stored template names, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed.
    fn list(&self) -> Result<Vec<String>>;
}
