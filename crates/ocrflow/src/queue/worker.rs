//! Long-running receive → consume → settle loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::consumer::{BatchReport, QueueConsumer};
use super::source::MessageSource;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub batches: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl WorkerStats {
    fn record(&mut self, report: &BatchReport) {
        self.batches += 1;
        self.succeeded += report.processed;
        self.failed += report.failed;
    }
}

pub struct QueueWorker {
    source: Arc<dyn MessageSource>,
    consumer: QueueConsumer,
    batch_size: usize,
    idle_delay: Duration,
}

impl QueueWorker {
    pub fn new(
        source: Arc<dyn MessageSource>,
        consumer: QueueConsumer,
        batch_size: usize,
        idle_delay: Duration,
    ) -> Self {
        Self {
            source,
            consumer,
            batch_size: batch_size.max(1),
            idle_delay,
        }
    }

    /// Receives and consumes one batch. `None` when the source had nothing.
    pub async fn run_once(&self) -> Option<BatchReport> {
        let batch = match self.source.receive(self.batch_size).await {
            Ok(batch) if batch.is_empty() => return None,
            Ok(batch) => batch,
            Err(e) => {
                warn!("Failed to receive messages: {}", e);
                return None;
            }
        };

        debug!("Received {} message(s)", batch.len());
        let report = self.consumer.consume(&batch).await;
        if let Err(e) = self.source.settle(&report).await {
            // unsettled messages become visible again and are redelivered
            warn!("Failed to settle batch: {}", e);
        }
        Some(report)
    }

    /// Consumes until the source is empty.
    pub async fn drain(&self) -> WorkerStats {
        let mut stats = WorkerStats::default();
        while let Some(report) = self.run_once().await {
            stats.record(&report);
        }
        stats
    }

    /// Consumes until `shutdown` turns true or its sender is dropped. A batch
    /// already in progress is finished first.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> WorkerStats {
        let mut stats = WorkerStats::default();
        info!("Queue worker started (batch size {})", self.batch_size);

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.run_once().await {
                Some(report) => stats.record(&report),
                None => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.idle_delay) => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        }

        info!(
            "Queue worker stopped after {} batch(es): {} succeeded, {} failed",
            stats.batches, stats.succeeded, stats.failed
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{JobOutcome, JobProcessor, JobRequest, PipelineError};
    use crate::job::JobStatus;
    use crate::queue::{MemoryQueue, RawMessage};
    use crate::store::MemoryJobStore;
    use async_trait::async_trait;

    struct AlwaysDone;

    #[async_trait]
    impl JobProcessor for AlwaysDone {
        async fn process(&self, _request: &JobRequest) -> Result<JobOutcome, PipelineError> {
            Ok(JobOutcome::AlreadyTerminal(JobStatus::Completed))
        }
    }

    fn message(id: &str) -> RawMessage {
        RawMessage::new(
            id,
            format!(r#"{{"job_id":"{}","created_at":"t1","source_location":{{"container":"b","key":"k"}}}}"#, id),
        )
    }

    fn worker(queue: Arc<MemoryQueue>) -> QueueWorker {
        let consumer = QueueConsumer::new(Arc::new(AlwaysDone), Arc::new(MemoryJobStore::new()), 2);
        QueueWorker::new(queue, consumer, 2, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_drain_consumes_everything() {
        let queue = Arc::new(MemoryQueue::new(3));
        queue.extend((0..5).map(|i| message(&format!("m{}", i))));
        queue.push(RawMessage::new("broken", "{"));

        let stats = worker(queue.clone()).drain().await;

        assert_eq!(stats.succeeded, 5);
        // a malformed message is rejected once, never redelivered
        assert_eq!(stats.failed, 1);
        assert!(queue.is_empty());
        assert_eq!(queue.dead_letters().len(), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let queue = Arc::new(MemoryQueue::new(3));
        queue.push(message("m1"));
        let (tx, rx) = watch::channel(false);

        let worker = worker(queue.clone());
        let handle = tokio::spawn(async move { worker.run(rx).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        let stats = handle.await.unwrap();

        assert_eq!(stats.succeeded, 1);
        assert!(queue.is_empty());
    }
}
