//! `SQLite`-backed resolution store.
//!
//! Schema:
//!
//! ```sql
//! CREATE TABLE resolutions (path TEXT PRIMARY KEY, payload TEXT NOT NULL, stored_at INTEGER NOT NULL);
//! CREATE TABLE resolution_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL);
//! ```
//!
//! The `fingerprint` meta row names the library the rows were resolved from.

use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::instrument;

use crate::models::ResolvedComponent;
use crate::storage::sqlite::{acquire_lock, configure_connection, sqlite_error};
use crate::storage::traits::ResolutionStore;
use crate::{Error, Result, current_timestamp};

const FINGERPRINT_KEY: &str = "fingerprint";

/// Resolution store persisted in a single `SQLite` file.
///
/// A `Mutex<Connection>` serializes writers, which gives the one-writer-per-key
/// guarantee the cache needs.
pub struct SqliteResolutionStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteResolutionStore {
    /// Opens (or creates) the store at `path` for the library `fingerprint`.
    ///
    /// Rows stamped with a different fingerprint are dropped on open, so a
    /// restart against the same library keeps the tier warm.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(path: impl AsRef<Path>, fingerprint: &str) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::operation("create_resolution_dir", e))?;
        }
        let conn = Connection::open(path).map_err(|e| sqlite_error("open_resolution_db", e))?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(path.to_path_buf()),
        };
        store.initialize(fingerprint)?;
        Ok(store)
    }

    /// Creates a store in memory (tests, ephemeral runs).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory(fingerprint: &str) -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| sqlite_error("open_resolution_db", e))?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        store.initialize(fingerprint)?;
        Ok(store)
    }

    /// Path of the database file, if file-backed.
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn initialize(&self, fingerprint: &str) -> Result<()> {
        {
            let conn = acquire_lock(&self.conn);
            configure_connection(&conn)?;
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS resolutions (
                    path TEXT PRIMARY KEY,
                    payload TEXT NOT NULL,
                    stored_at INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS resolution_meta (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );",
            )
            .map_err(|e| sqlite_error("init_resolution_schema", e))?;
        }

        if self.fingerprint()?.as_deref() != Some(fingerprint) {
            tracing::info!(fingerprint, "Library fingerprint changed, dropping L2 entries");
            self.invalidate(fingerprint)?;
        }
        Ok(())
    }
}

impl ResolutionStore for SqliteResolutionStore {
    #[instrument(skip(self), fields(operation = "l2_get"))]
    fn get(&self, path: &str) -> Result<Option<ResolvedComponent>> {
        let payload: Option<String> = {
            let conn = acquire_lock(&self.conn);
            conn.query_row(
                "SELECT payload FROM resolutions WHERE path = ?1",
                params![path],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| sqlite_error("l2_get", e))?
        };

        payload
            .map(|p| serde_json::from_str(&p).map_err(|e| Error::operation("decode_l2_entry", e)))
            .transpose()
    }

    #[instrument(skip(self, component), fields(operation = "l2_put"))]
    fn put(&self, path: &str, component: &ResolvedComponent) -> Result<()> {
        let payload =
            serde_json::to_string(component).map_err(|e| Error::operation("encode_l2_entry", e))?;
        let stored_at = i64::try_from(current_timestamp()).unwrap_or(i64::MAX);

        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO resolutions (path, payload, stored_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(path) DO UPDATE SET payload = excluded.payload, stored_at = excluded.stored_at",
            params![path, payload, stored_at],
        )
        .map_err(|e| sqlite_error("l2_put", e))?;
        Ok(())
    }

    fn invalidate(&self, fingerprint: &str) -> Result<()> {
        let mut conn = acquire_lock(&self.conn);
        let tx = conn
            .transaction()
            .map_err(|e| sqlite_error("l2_invalidate", e))?;
        tx.execute("DELETE FROM resolutions", [])
            .map_err(|e| sqlite_error("l2_invalidate", e))?;
        tx.execute(
            "INSERT INTO resolution_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![FINGERPRINT_KEY, fingerprint],
        )
        .map_err(|e| sqlite_error("l2_invalidate", e))?;
        tx.commit().map_err(|e| sqlite_error("l2_invalidate", e))?;
        metrics::counter!("cardsmith_l2_invalidations_total").increment(1);
        Ok(())
    }

    fn fingerprint(&self) -> Result<Option<String>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT value FROM resolution_meta WHERE key = ?1",
            params![FINGERPRINT_KEY],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| sqlite_error("l2_fingerprint", e))
    }

    fn len(&self) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM resolutions", [], |row| row.get(0))
            .map_err(|e| sqlite_error("l2_len", e))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}
