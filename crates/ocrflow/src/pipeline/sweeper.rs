//! Fails jobs that stopped making progress, e.g. after a worker crashed
//! mid-poll. A job a worker started that has been silent longer than the
//! polling ceiling plus a grace period can no longer be finished by that
//! worker. Queued jobs have not been picked up yet and are left alone.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::job::{JobKey, JobPatch, PatchOutcome};
use crate::store::{JobStore, StoreError};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub examined: usize,
    pub failed: Vec<JobKey>,
}

pub struct StaleJobSweeper {
    store: Arc<dyn JobStore>,
    max_age: Duration,
}

impl StaleJobSweeper {
    pub fn new(store: Arc<dyn JobStore>, max_wait: Duration, grace: Duration) -> Self {
        Self {
            store,
            max_age: max_wait + grace,
        }
    }

    pub async fn sweep(&self) -> Result<SweepReport, StoreError> {
        self.sweep_at(Utc::now()).await
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport, StoreError> {
        let cutoff = chrono::Duration::from_std(self.max_age)
            .ok()
            .and_then(|age| now.checked_sub_signed(age));
        let Some(cutoff) = cutoff else {
            return Ok(SweepReport::default());
        };

        let stale = self.store.list_in_flight_before(cutoff).await?;
        let mut report = SweepReport {
            examined: stale.len(),
            failed: Vec::new(),
        };

        for job in stale {
            let key = job.key();
            let message = format!(
                "Job abandoned: no progress for over {}s (last stage: {})",
                self.max_age.as_secs(),
                job.processing_stage.as_deref().unwrap_or("unknown")
            );
            match self.store.patch(&key, &JobPatch::failed(&message)).await {
                Ok(PatchOutcome::Applied) => {
                    warn!("Marked stale job {} as failed", key);
                    report.failed.push(key);
                }
                Ok(PatchOutcome::Terminal(status)) => {
                    info!("Stale job {} finished as {} before sweep", key, status);
                }
                Err(e) => warn!("Could not fail stale job {}: {}", key, e),
            }
        }

        Ok(report)
    }
}
