//! SQLite-backed job store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{format_timestamp, now_timestamp, JobQuery, JobStore, StoreError};
use crate::db::{job_repo, Database};
use crate::job::{JobKey, JobPatch, JobRecord, PatchOutcome};

/// Job store over the `jobs` table. Statements are sub-millisecond, so they
/// run inline on the calling task.
#[derive(Clone)]
pub struct SqliteJobStore {
    db: Database,
}

impl SqliteJobStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl JobQuery for SqliteJobStore {
    async fn list_for_user(
        &self,
        user_id: &str,
        limit: u64,
    ) -> Result<Vec<JobRecord>, StoreError> {
        Ok(job_repo::list_for_user(&self.db, user_id, limit)?)
    }

    async fn get(&self, key: &JobKey) -> Result<Option<JobRecord>, StoreError> {
        Ok(job_repo::find(&self.db, key)?)
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn patch(&self, key: &JobKey, patch: &JobPatch) -> Result<PatchOutcome, StoreError> {
        let outcome = job_repo::patch(&self.db, key, patch, &now_timestamp()).map_err(|e| {
            if e.is_busy() {
                log::warn!("Jobs table locked by another process while writing {}", key);
            }
            e
        })?;
        if let PatchOutcome::Terminal(status) = outcome {
            log::debug!("Skipped write to {} job {}", status, key);
        }
        Ok(outcome)
    }

    async fn list_in_flight_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<JobRecord>, StoreError> {
        Ok(job_repo::list_in_flight_before(
            &self.db,
            &format_timestamp(cutoff),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStatus;

    fn completed_patch() -> JobPatch {
        JobPatch {
            status: Some(JobStatus::Completed),
            processing_stage: Some("completed".to_string()),
            extracted_text: Some("Hello".to_string()),
            corrected_text: Some("Hello".to_string()),
            confidence_score: Some(90.0),
            correction_confidence: Some(0.8),
            combined_confidence: Some(0.87),
            document_type: Some("general".to_string()),
            ..JobPatch::default()
        }
    }

    #[tokio::test]
    async fn test_repeated_terminal_write_is_idempotent() {
        let store = SqliteJobStore::new(Database::open_in_memory().unwrap());
        let key = JobKey::new("j1", "t1");

        store.patch(&key, &completed_patch()).await.unwrap();
        let first = store.get(&key).await.unwrap().unwrap();

        let outcome = store.patch(&key, &completed_patch()).await.unwrap();
        assert_eq!(outcome, PatchOutcome::Terminal(JobStatus::Completed));
        let second = store.get(&key).await.unwrap().unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_list_in_flight_uses_formatted_cutoff() {
        let store = SqliteJobStore::new(Database::open_in_memory().unwrap());
        let key = JobKey::new("j1", "t1");
        store
            .patch(&key, &JobPatch::stage(JobStatus::Processing, "text_recognition"))
            .await
            .unwrap();

        let future = Utc::now() + chrono::Duration::minutes(5);
        let past = Utc::now() - chrono::Duration::minutes(5);
        assert_eq!(store.list_in_flight_before(future).await.unwrap().len(), 1);
        assert!(store.list_in_flight_before(past).await.unwrap().is_empty());
    }
}
