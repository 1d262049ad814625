//! On-disk resolution tier implementations.

mod sqlite;

pub use sqlite::SqliteResolutionStore;
