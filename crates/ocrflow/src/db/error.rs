//! Failures of the SQLite jobs table.

use std::path::PathBuf;

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Jobs table query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Cannot create jobs database directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Jobs schema migration v{version} failed: {reason}")]
    Migration { version: u32, reason: String },

    /// A writer panicked while holding the connection.
    #[error("Jobs database connection is unusable after a panicked write")]
    ConnectionPoisoned,
}

impl DatabaseError {
    /// Another process holds the SQLite write lock past the busy timeout.
    /// The same write may succeed on a later attempt.
    pub fn is_busy(&self) -> bool {
        match self {
            DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => {
                matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
            }
            _ => false,
        }
    }
}
