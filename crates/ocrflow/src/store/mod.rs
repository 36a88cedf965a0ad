//! Job Store Adapter: durable, keyed, merge-patch persistence of job records.
//!
//! `JobQuery` is the read surface the observer consumes; `JobStore` adds the
//! write surface the pipeline uses. Writes go through `RetryingJobStore` in
//! production so a single failed write does not abandon a job.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use crate::db::DatabaseError;
use crate::job::{JobKey, JobPatch, JobRecord, PatchOutcome};

pub mod memory;
pub mod retry;
pub mod sqlite;

pub use memory::MemoryJobStore;
pub use retry::{RetryPolicy, RetryingJobStore};
pub use sqlite::SqliteJobStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Job store unavailable: {0}")]
    Unavailable(String),

    #[error("Persistence failed after {attempts} attempts: {message}")]
    PersistenceFailed { attempts: u32, message: String },
}

/// Read-only query surface over stored jobs.
#[async_trait]
pub trait JobQuery: Send + Sync {
    /// Lists a user's jobs, newest first, at most `limit` of them.
    async fn list_for_user(&self, user_id: &str, limit: u64)
        -> Result<Vec<JobRecord>, StoreError>;

    async fn get(&self, key: &JobKey) -> Result<Option<JobRecord>, StoreError>;
}

/// Write surface: field-level merge keyed by `(job_id, created_at)`.
#[async_trait]
pub trait JobStore: JobQuery {
    /// Merges the supplied fields and stamps `updated_at`. Records that are
    /// already terminal are never modified.
    async fn patch(&self, key: &JobKey, patch: &JobPatch) -> Result<PatchOutcome, StoreError>;

    /// Jobs a worker started (`processing` or `ai_correction`) whose last write
    /// is older than `cutoff`. Queued jobs are excluded.
    async fn list_in_flight_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<JobRecord>, StoreError>;
}

/// Formats a timestamp the way every store writes them. Fixed precision keeps
/// lexicographic and chronological order identical.
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}
