//! Connection handling for `SQLite` stores.

use crate::{Error, Result};
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};

/// Acquires a mutex, recovering the inner value if it was poisoned.
///
/// A panic inside a previous critical section leaves the connection usable,
/// so the guard is recovered and a warning is logged.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("SQLite mutex was poisoned, recovering");
            metrics::counter!("cardsmith_sqlite_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Applies WAL journaling, NORMAL synchronous mode and a 5 second busy timeout.
///
/// Pragma results are ignored: in-memory databases reject WAL and report
/// `memory` instead, which is fine for tests.
///
/// # Errors
///
/// Currently infallible; kept fallible so callers propagate future pragma
/// failures.
pub fn configure_connection(conn: &Connection) -> Result<()> {
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", "5000");
    Ok(())
}

/// Wraps a `rusqlite` error as an [`Error::OperationFailed`].
#[allow(clippy::needless_pass_by_value)]
pub fn sqlite_error(operation: &str, e: rusqlite::Error) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}
