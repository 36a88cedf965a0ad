//! Local job state held by the observer, and the pure rules that act on it:
//! reconciliation of provisional jobs, structural diffing, and poll cadence.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;

use crate::config::ObserverConfig;
use crate::job::{JobKey, JobRecord, JobStatus};

use super::group::{group_documents, ObservedDocument};

/// A job whose status differs between two views. Completed jobs carry their
/// outcome, failed ones their error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub job_id: String,
    pub created_at: String,
    pub from: JobStatus,
    pub to: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Status transitions for jobs present in both views.
pub fn status_changes(previous: &[JobRecord], next: &[JobRecord]) -> Vec<StatusChange> {
    let before: HashMap<JobKey, JobStatus> = previous.iter().map(|j| (j.key(), j.status)).collect();
    next.iter()
        .filter_map(|job| {
            let from = *before.get(&job.key())?;
            let completed = job.status == JobStatus::Completed;
            (from != job.status).then(|| StatusChange {
                job_id: job.job_id.clone(),
                created_at: job.created_at.clone(),
                from,
                to: job.status,
                error: job.error.clone(),
                document_type: job.document_type.clone().filter(|_| completed),
                confidence: job.display_confidence().filter(|_| completed),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Last list returned by the store, newest first.
    jobs: Vec<JobRecord>,
    /// Optimistic entries not yet confirmed by the store.
    provisional: Vec<JobRecord>,
}

impl Snapshot {
    /// Provisional entries first, then stored jobs.
    pub fn view(&self) -> Vec<JobRecord> {
        self.provisional
            .iter()
            .chain(self.jobs.iter())
            .cloned()
            .collect()
    }

    pub fn documents(&self) -> Vec<ObservedDocument> {
        group_documents(&self.view())
    }

    pub fn jobs(&self) -> &[JobRecord] {
        &self.jobs
    }

    pub fn provisional(&self) -> &[JobRecord] {
        &self.provisional
    }

    /// Adds or replaces an optimistic entry.
    pub fn add_provisional(&mut self, record: JobRecord) {
        let key = record.key();
        if self.jobs.iter().any(|j| j.key() == key) {
            return;
        }
        self.provisional.retain(|p| p.key() != key);
        self.provisional.insert(0, record);
    }

    /// Drops an optimistic entry whose submission failed.
    pub fn remove_provisional(&mut self, key: &JobKey) -> bool {
        let before = self.provisional.len();
        self.provisional.retain(|p| p.key() != *key);
        self.provisional.len() != before
    }

    /// Replaces the stored jobs with a fresh fetch. Provisional entries the
    /// store now knows about are dropped. Returns the status changes if the
    /// visible state changed at all, `None` if it is identical.
    pub fn apply(&mut self, jobs: Vec<JobRecord>) -> Option<Vec<StatusChange>> {
        let previous = self.view();

        self.provisional
            .retain(|p| !jobs.iter().any(|j| j.key() == p.key()));
        self.jobs = jobs;

        let next = self.view();
        if next == previous {
            None
        } else {
            Some(status_changes(&previous, &next))
        }
    }

    pub fn any_active(&self) -> bool {
        self.jobs.iter().chain(&self.provisional).any(|j| j.status.is_active())
    }

    pub fn any_waiting(&self) -> bool {
        self.jobs.iter().chain(&self.provisional).any(|j| j.status.is_waiting())
    }
}

/// Poll cadence.
#[derive(Debug, Clone, PartialEq)]
pub struct ObserverSettings {
    /// While any job is being processed.
    pub processing_interval: Duration,
    /// While jobs wait and none is processed.
    pub pending_interval: Duration,
    /// When everything is terminal (or there is nothing).
    pub idle_interval: Duration,
    pub max_idle_interval: Duration,
    /// Unchanged idle polls before the idle interval doubles.
    pub idle_backoff_after: u32,
    pub page_size: u64,
}

impl ObserverSettings {
    pub fn from_config(config: &ObserverConfig) -> Self {
        Self {
            processing_interval: Duration::from_millis(config.processing_interval_ms),
            pending_interval: Duration::from_millis(config.pending_interval_ms),
            idle_interval: Duration::from_millis(config.idle_interval_ms),
            max_idle_interval: Duration::from_millis(config.max_idle_interval_ms),
            idle_backoff_after: config.idle_backoff_after,
            page_size: config.page_size,
        }
    }

    /// Delay until the next scheduled fetch. `idle_streak` counts
    /// consecutive scheduled fetches that found only terminal, unchanged jobs.
    pub fn interval_for(&self, snapshot: &Snapshot, idle_streak: u32) -> Duration {
        if snapshot.any_active() {
            return self.processing_interval;
        }
        if snapshot.any_waiting() {
            return self.pending_interval;
        }
        let doublings = (idle_streak / self.idle_backoff_after.max(1)).min(16);
        self.idle_interval
            .saturating_mul(1 << doublings)
            .min(self.max_idle_interval)
    }
}

impl Default for ObserverSettings {
    fn default() -> Self {
        Self::from_config(&ObserverConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str, status: JobStatus) -> JobRecord {
        let mut record = JobRecord::new(id, "t1");
        record.status = status;
        record
    }

    fn snapshot_of(jobs: Vec<JobRecord>) -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot.apply(jobs);
        snapshot
    }

    #[test]
    fn test_apply_reports_only_real_changes() {
        let mut snapshot = Snapshot::default();
        let first = vec![job("a", JobStatus::Processing), job("b", JobStatus::Pending)];

        assert_eq!(snapshot.apply(first.clone()), Some(vec![]));
        assert_eq!(snapshot.apply(first), None);

        let changes = snapshot
            .apply(vec![job("a", JobStatus::Completed), job("b", JobStatus::Pending)])
            .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].job_id, "a");
        assert_eq!(changes[0].from, JobStatus::Processing);
        assert_eq!(changes[0].to, JobStatus::Completed);
    }

    #[test]
    fn test_completed_change_carries_outcome() {
        let mut snapshot = snapshot_of(vec![job("a", JobStatus::AiCorrection)]);
        let mut done = job("a", JobStatus::Completed);
        done.document_type = Some("invoice".to_string());
        done.combined_confidence = Some(0.87);

        let changes = snapshot.apply(vec![done]).unwrap();
        assert_eq!(changes[0].document_type.as_deref(), Some("invoice"));
        assert_eq!(changes[0].confidence, Some(0.87));

        let json = serde_json::to_value(&changes[0]).unwrap();
        assert_eq!(json["documentType"], "invoice");
        assert_eq!(json["confidence"], 0.87);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_content_change_without_status_change() {
        let mut snapshot = snapshot_of(vec![job("a", JobStatus::Processing)]);
        let mut updated = job("a", JobStatus::Processing);
        updated.processing_stage = Some("text_recognition".to_string());
        assert_eq!(snapshot.apply(vec![updated]), Some(vec![]));
    }

    #[test]
    fn test_provisional_replaced_by_authoritative_record() {
        let mut snapshot = Snapshot::default();
        snapshot.add_provisional(job("new", JobStatus::Pending));
        assert_eq!(snapshot.view().len(), 1);

        let changes = snapshot.apply(vec![job("new", JobStatus::Processing)]).unwrap();
        assert!(snapshot.provisional().is_empty());
        assert_eq!(snapshot.view().len(), 1);
        assert_eq!(changes[0].from, JobStatus::Pending);
        assert_eq!(changes[0].to, JobStatus::Processing);
    }

    #[test]
    fn test_provisional_survives_fetch_until_confirmed_or_removed() {
        let mut snapshot = Snapshot::default();
        snapshot.add_provisional(job("new", JobStatus::Pending));
        snapshot.apply(vec![job("old", JobStatus::Completed)]);

        let ids: Vec<String> = snapshot.view().into_iter().map(|j| j.job_id).collect();
        assert_eq!(ids, vec!["new", "old"]);

        assert!(snapshot.remove_provisional(&JobKey::new("new", "t1")));
        assert!(!snapshot.remove_provisional(&JobKey::new("new", "t1")));
        assert_eq!(snapshot.view().len(), 1);
    }

    #[test]
    fn test_interval_tiers() {
        let settings = ObserverSettings::default();

        let active = snapshot_of(vec![job("a", JobStatus::AiCorrection), job("b", JobStatus::Pending)]);
        assert_eq!(settings.interval_for(&active, 0), Duration::from_millis(1500));

        let waiting = snapshot_of(vec![job("a", JobStatus::Queued), job("b", JobStatus::Completed)]);
        assert_eq!(settings.interval_for(&waiting, 0), Duration::from_secs(3));

        let idle = snapshot_of(vec![job("a", JobStatus::Completed), job("b", JobStatus::Failed)]);
        assert_eq!(settings.interval_for(&idle, 0), Duration::from_secs(30));

        let empty = Snapshot::default();
        assert_eq!(settings.interval_for(&empty, 0), Duration::from_secs(30));
    }

    #[test]
    fn test_idle_backoff_doubles_and_caps() {
        let settings = ObserverSettings::default();
        let idle = snapshot_of(vec![job("a", JobStatus::Completed)]);

        assert_eq!(settings.interval_for(&idle, 4), Duration::from_secs(30));
        assert_eq!(settings.interval_for(&idle, 5), Duration::from_secs(60));
        assert_eq!(settings.interval_for(&idle, 10), Duration::from_secs(120));
        assert_eq!(settings.interval_for(&idle, 15), Duration::from_secs(240));
        assert_eq!(settings.interval_for(&idle, 20), Duration::from_secs(300));
        assert_eq!(settings.interval_for(&idle, 1000), Duration::from_secs(300));
    }
}
