//! SQLite persistence for job records.
//!
//! One `jobs` table keyed by `(job_id, created_at)`, the composite key every
//! producer and reader of a job agrees on. Schema changes are versioned in
//! `migrations`; row mapping and merge-patch writes live in `job_repo`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

pub mod error;
pub mod job_repo;
pub mod migrations;

pub use error::DatabaseError;

/// Shared handle to the jobs database. Clones share one connection; SQLite
/// serializes writers, so the mutex costs nothing extra.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens the jobs database at `path`, creating parent directories and
    /// bringing the schema up to date.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::CreateDir {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        // WAL lets the observer read while a worker writes
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
        Self::prepare(conn, &path.display().to_string())
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::prepare(Connection::open_in_memory()?, ":memory:")
    }

    fn prepare(conn: Connection, location: &str) -> Result<Self, DatabaseError> {
        migrations::run_all(&conn)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        log::info!(
            "Jobs database ready at {} (schema v{})",
            location,
            db.schema_version()?
        );
        Ok(db)
    }

    /// Highest applied migration.
    pub fn schema_version(&self) -> Result<u32, DatabaseError> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COALESCE(MAX(version), 0) FROM _migrations",
                [],
                |r| r.get(0),
            )?)
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|_| DatabaseError::ConnectionPoisoned)?;
        f(&conn)
    }
}
