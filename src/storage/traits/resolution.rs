//! On-disk resolution tier trait.

use crate::Result;
use crate::models::ResolvedComponent;

/// Persistent store backing the second tier of the resolution cache.
///
/// Entries are keyed by component path and stamped with the fingerprint of
/// the library they were resolved from. A new fingerprint drops every entry.
///
/// # Implementor Notes
///
/// - Methods use `&self`; serialize writers internally (at most one writer
///   per key at a time)
/// - Errors are reported, the cache degrades to library resolution on failure
pub trait ResolutionStore: Send + Sync {
    /// Loads the entry for a path.
    ///
    /// # Errors
    ///
    /// Returns an error if the read or decode fails.
    fn get(&self, path: &str) -> Result<Option<ResolvedComponent>>;

    /// Stores the entry for a path.
    ///
    /// # Errors
    ///
    /// Returns an error if the encode or write fails.
    fn put(&self, path: &str, component: &ResolvedComponent) -> Result<()>;

    /// Drops every entry and records the fingerprint of the new library.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be cleared.
    fn invalidate(&self, fingerprint: &str) -> Result<()>;

    /// Fingerprint of the library the entries belong to.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn fingerprint(&self) -> Result<Option<String>>;

    /// Number of stored entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the count fails.
    fn len(&self) -> Result<usize>;

    /// Returns true if no entries are stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the count fails.
    fn is_empty(&self) -> Result<bool> {
        self.len().map(|n| n == 0)
    }
}
