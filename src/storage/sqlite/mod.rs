//! Shared `SQLite` helpers.
//!
//! - [`acquire_lock`]: mutex acquisition with poison recovery
//! - [`configure_connection`]: WAL mode, synchronous level and busy timeout

mod connection;

pub use connection::{acquire_lock, configure_connection, sqlite_error};
