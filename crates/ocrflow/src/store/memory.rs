//! In-memory job store with the same merge and terminal rules as SQLite.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{format_timestamp, now_timestamp, JobQuery, JobStore, StoreError};
use crate::job::{JobKey, JobPatch, JobRecord, PatchOutcome};

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobKey, JobRecord>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a record as-is, the way the intake path creates rows.
    pub fn insert(&self, record: JobRecord) {
        self.write().insert(record.key(), record);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobKey, JobRecord>> {
        match self.jobs.read() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Memory job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobKey, JobRecord>> {
        match self.jobs.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Memory job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

#[async_trait]
impl JobQuery for MemoryJobStore {
    async fn list_for_user(
        &self,
        user_id: &str,
        limit: u64,
    ) -> Result<Vec<JobRecord>, StoreError> {
        let mut jobs: Vec<JobRecord> = self
            .read()
            .values()
            .filter(|j| j.user_id.as_deref() == Some(user_id))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.job_id.cmp(&b.job_id))
        });
        jobs.truncate(limit as usize);
        Ok(jobs)
    }

    async fn get(&self, key: &JobKey) -> Result<Option<JobRecord>, StoreError> {
        Ok(self.read().get(key).cloned())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn patch(&self, key: &JobKey, patch: &JobPatch) -> Result<PatchOutcome, StoreError> {
        let now = now_timestamp();
        let mut jobs = self.write();
        let record = jobs.entry(key.clone()).or_insert_with(|| {
            let mut fresh = JobRecord::new(&key.job_id, &key.created_at);
            fresh.updated_at = Some(now.clone());
            fresh
        });

        if record.status.is_terminal() {
            return Ok(PatchOutcome::Terminal(record.status));
        }

        patch.apply_to(record, &now);
        Ok(PatchOutcome::Applied)
    }

    async fn list_in_flight_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<JobRecord>, StoreError> {
        let cutoff = format_timestamp(cutoff);
        let mut jobs: Vec<JobRecord> = self
            .read()
            .values()
            .filter(|j| j.status.is_active())
            .filter(|j| j.updated_at.as_deref().is_some_and(|u| u < cutoff.as_str()))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        Ok(jobs)
    }
}
