//! Bounded retry around job store writes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use super::{JobQuery, JobStore, StoreError};
use crate::clock::Clock;
use crate::config::PersistenceConfig;
use crate::job::{JobKey, JobPatch, JobRecord, PatchOutcome};

/// Linear retry schedule: the wait after failed attempt `n` is `base_delay * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &PersistenceConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Wraps a store so that failed writes are retried before giving up with
/// `StoreError::PersistenceFailed`. Reads pass straight through.
pub struct RetryingJobStore {
    inner: Arc<dyn JobStore>,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl RetryingJobStore {
    pub fn new(inner: Arc<dyn JobStore>, policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            policy,
            clock,
        }
    }
}

#[async_trait]
impl JobQuery for RetryingJobStore {
    async fn list_for_user(
        &self,
        user_id: &str,
        limit: u64,
    ) -> Result<Vec<JobRecord>, StoreError> {
        self.inner.list_for_user(user_id, limit).await
    }

    async fn get(&self, key: &JobKey) -> Result<Option<JobRecord>, StoreError> {
        self.inner.get(key).await
    }
}

#[async_trait]
impl JobStore for RetryingJobStore {
    async fn patch(&self, key: &JobKey, patch: &JobPatch) -> Result<PatchOutcome, StoreError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.inner.patch(key, patch).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if attempt >= max_attempts => {
                    return Err(StoreError::PersistenceFailed {
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    let delay = self.policy.delay_after(attempt);
                    warn!(
                        job_id = %key.job_id,
                        created_at = %key.created_at,
                        "Job store write attempt {} failed: {}. Retrying in {:?}",
                        attempt,
                        e,
                        delay
                    );
                    self.clock.sleep(delay).await;
                }
            }
        }
    }

    async fn list_in_flight_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<JobRecord>, StoreError> {
        self.inner.list_in_flight_before(cutoff).await
    }
}
