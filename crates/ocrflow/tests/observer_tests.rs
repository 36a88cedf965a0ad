//! Observer behaviour against a live store: cadence, notifications, grouping.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};

use common::TestPipeline;
use ocrflow::clock::SystemClock;
use ocrflow::job::{JobKey, JobPatch, JobRecord, JobStatus};
use ocrflow::observer::{
    JobObserver, ObservedDocument, ObserverEvent, ObserverSettings, RefreshTrigger, StatusChange,
};
use ocrflow::queue::RawMessage;
use ocrflow::store::{JobStore, MemoryJobStore};

fn fast_settings(idle: Duration) -> ObserverSettings {
    ObserverSettings {
        processing_interval: Duration::from_millis(10),
        pending_interval: Duration::from_millis(20),
        idle_interval: idle,
        max_idle_interval: idle * 4,
        idle_backoff_after: 5,
        page_size: 100,
    }
}

fn job(id: &str, status: JobStatus) -> JobRecord {
    let mut record = JobRecord::new(id, "t1");
    record.user_id = Some("u1".to_string());
    record.status = status;
    record
}

fn page(id: &str, group: &str, number: u32, status: JobStatus) -> JobRecord {
    let mut record = job(id, status);
    record.group_id = Some(group.to_string());
    record.page_number = Some(number);
    record
}

/// Waits for the next status change, skipping other events.
async fn next_change(rx: &mut broadcast::Receiver<ObserverEvent>) -> StatusChange {
    let wait = async {
        loop {
            if let ObserverEvent::StatusChanged(change) = rx.recv().await.unwrap() {
                return change;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("no status change within 5s")
}

#[tokio::test]
async fn test_running_observer_reports_transitions() {
    let store = Arc::new(MemoryJobStore::new());
    store.insert(job("a", JobStatus::Processing));

    let (observer, _handle) =
        JobObserver::new(store.clone(), "u1", fast_settings(Duration::from_millis(50)), Arc::new(SystemClock));
    let mut events = observer.subscribe();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(observer.run(shutdown_rx));

    // the first fetch only establishes the baseline
    let first = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(first, ObserverEvent::DocumentsUpdated { .. }));

    store
        .patch(&JobKey::new("a", "t1"), &JobPatch::stage(JobStatus::AiCorrection, "ai_correction"))
        .await
        .unwrap();
    let change = next_change(&mut events).await;
    assert_eq!(change.job_id, "a");
    assert_eq!(change.to, JobStatus::AiCorrection);

    store
        .patch(&JobKey::new("a", "t1"), &JobPatch::failed("Recognition service reported failure: blurry"))
        .await
        .unwrap();
    let change = next_change(&mut events).await;
    assert_eq!(change.from, JobStatus::AiCorrection);
    assert_eq!(change.to, JobStatus::Failed);
    assert!(change.error.unwrap().contains("blurry"));

    let _ = shutdown_tx.send(true);
    let observer = task.await.unwrap();
    assert_eq!(observer.jobs()[0].status, JobStatus::Failed);
}

#[tokio::test]
async fn test_manual_refresh_does_not_wait_for_idle_timer() {
    let store = Arc::new(MemoryJobStore::new());
    store.insert(job("a", JobStatus::Completed));

    // idle timer far beyond the test timeout
    let (observer, handle) =
        JobObserver::new(store.clone(), "u1", fast_settings(Duration::from_secs(600)), Arc::new(SystemClock));
    let mut events = observer.subscribe();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(observer.run(shutdown_rx));

    let first = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(first, ObserverEvent::DocumentsUpdated { .. }));

    let mut new_job = job("b", JobStatus::Queued);
    new_job.created_at = "t2".to_string();
    store.insert(new_job);

    assert!(handle.refresh(RefreshTrigger::Reconnected).await);
    let update = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    match update {
        ObserverEvent::DocumentsUpdated { documents } => assert_eq!(documents.len(), 2),
        other => panic!("unexpected event {:?}", other),
    }

    let _ = shutdown_tx.send(true);
    task.await.unwrap();
}

#[tokio::test]
async fn test_new_submission_while_idle_switches_to_fast_cadence() {
    let store = Arc::new(MemoryJobStore::new());
    store.insert(job("a", JobStatus::Completed));

    let (observer, handle) =
        JobObserver::new(store.clone(), "u1", fast_settings(Duration::from_secs(600)), Arc::new(SystemClock));
    let mut events = observer.subscribe();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(observer.run(shutdown_rx));

    let first = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(first, ObserverEvent::DocumentsUpdated { .. }));

    // no refresh follows: only the scheduled poll can pick this up
    assert!(handle.add_provisional(job("b", JobStatus::Pending)).await);
    store.insert(job("b", JobStatus::Processing));

    let change = next_change(&mut events).await;
    assert_eq!(change.job_id, "b");
    assert_eq!(change.to, JobStatus::Processing);

    let _ = shutdown_tx.send(true);
    task.await.unwrap();
}

#[tokio::test]
async fn test_provisional_job_reconciled_through_handle() {
    let store = Arc::new(MemoryJobStore::new());
    let (observer, handle) =
        JobObserver::new(store.clone(), "u1", fast_settings(Duration::from_millis(30)), Arc::new(SystemClock));
    let mut events = observer.subscribe();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(observer.run(shutdown_rx));

    assert!(handle.add_provisional(job("new", JobStatus::Pending)).await);
    store.insert(job("new", JobStatus::Processing));

    let change = next_change(&mut events).await;
    assert_eq!(change.job_id, "new");
    assert_eq!(change.from, JobStatus::Pending);
    assert_eq!(change.to, JobStatus::Processing);

    let _ = shutdown_tx.send(true);
    let observer = task.await.unwrap();
    assert_eq!(observer.jobs().len(), 1);
}

#[tokio::test]
async fn test_pages_fold_into_one_document() {
    let store = Arc::new(MemoryJobStore::new());
    let mut third = page("p3", "g1", 3, JobStatus::Failed);
    third.error = Some("Recognition did not finish".to_string());
    store.insert(third);
    store.insert(page("p1", "g1", 1, JobStatus::Completed));
    store.insert(page("p2", "g1", 2, JobStatus::Completed));
    store.insert(job("solo", JobStatus::Queued));

    let (mut observer, _handle) =
        JobObserver::new(store, "u1", ObserverSettings::default(), Arc::new(SystemClock));
    observer.fetch().await.unwrap();

    let documents = observer.documents();
    assert_eq!(documents.len(), 2);

    let group = documents
        .iter()
        .find_map(|d| match d {
            ObservedDocument::Group { group } => Some(group),
            _ => None,
        })
        .unwrap();
    assert_eq!(group.group_id, "g1");
    assert_eq!(group.status, JobStatus::Failed);
    let order: Vec<u32> = group.pages.iter().filter_map(|p| p.page_number).collect();
    assert_eq!(order, vec![1, 2, 3]);
    assert_eq!(group.error.as_deref(), Some("Page 3: Recognition did not finish"));
}

#[tokio::test]
async fn test_pipeline_output_observed_as_completed_group() {
    let pipeline = TestPipeline::new();
    let mut batch = Vec::new();
    for n in 1..=2u32 {
        let key = format!("scan-{}.jpg", n);
        pipeline.upload(&key);
        let body = serde_json::json!({
            "job_id": format!("page-{}", n),
            "created_at": "t1",
            "source_location": { "container": "bucket", "key": key },
            "user_id": "u1",
            "group_id": "contract",
            "page_number": n,
        });
        batch.push(RawMessage::new(format!("m{}", n), body.to_string()));
    }

    let report = pipeline.consumer.consume(&batch).await;
    assert_eq!(report.processed, 2);

    let (mut observer, _handle) = JobObserver::new(
        pipeline.store.clone(),
        "u1",
        ObserverSettings::default(),
        Arc::new(SystemClock),
    );
    observer.fetch().await.unwrap();

    let documents = observer.documents();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].status(), JobStatus::Completed);
    assert!(documents[0].confidence().is_some());
    assert_eq!(documents[0].error(), None);
}
