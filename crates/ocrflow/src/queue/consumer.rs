//! Batch consumption with per-message failure isolation.

use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{error, info, info_span, warn, Instrument};

use crate::job::{JobKey, JobPatch};
use crate::pipeline::{JobOutcome, JobProcessor, PipelineError};
use crate::store::JobStore;

use super::message::{IngestionMessage, RawMessage};

/// Outcome of one message in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResult {
    pub message_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl MessageResult {
    fn success(message_id: &str, job_id: &str) -> Self {
        Self {
            message_id: message_id.to_string(),
            success: true,
            job_id: Some(job_id.to_string()),
            error: None,
            error_kind: None,
        }
    }

    fn failure(message_id: &str, job_id: Option<&str>, error: String, kind: &str) -> Self {
        Self {
            message_id: message_id.to_string(),
            success: false,
            job_id: job_id.map(str::to_string),
            error: Some(error),
            error_kind: Some(kind.to_string()),
        }
    }

    /// Failures that another delivery cannot fix. Malformed messages stay
    /// malformed.
    pub fn is_permanent(&self) -> bool {
        !self.success && self.error_kind.as_deref() == Some("validation")
    }
}

/// Per-batch report. Only ids listed in `redeliver` should go back on the
/// queue; permanent failures are counted in `failed` but never listed there.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    /// Messages that succeeded.
    pub processed: usize,
    pub failed: usize,
    pub results: Vec<MessageResult>,
    pub redeliver: Vec<String>,
}

impl BatchReport {
    pub fn from_results(results: Vec<MessageResult>) -> Self {
        let failed = results.iter().filter(|r| !r.success).count();
        let redeliver: Vec<String> = results
            .iter()
            .filter(|r| !r.success && !r.is_permanent())
            .map(|r| r.message_id.clone())
            .collect();
        Self {
            processed: results.len() - failed,
            failed,
            results,
            redeliver,
        }
    }
}

pub struct QueueConsumer {
    processor: Arc<dyn JobProcessor>,
    store: Arc<dyn JobStore>,
    concurrency: usize,
}

impl QueueConsumer {
    pub fn new(processor: Arc<dyn JobProcessor>, store: Arc<dyn JobStore>, concurrency: usize) -> Self {
        Self {
            processor,
            store,
            concurrency: concurrency.max(1),
        }
    }

    /// Processes every message in the batch. Up to `concurrency` run at once;
    /// results keep the batch order. Never fails as a whole.
    pub async fn consume(&self, batch: &[RawMessage]) -> BatchReport {
        let pending: Vec<_> = batch.iter().map(|message| self.handle(message)).collect();
        let results: Vec<MessageResult> = stream::iter(pending)
            .buffered(self.concurrency)
            .collect()
            .await;

        let report = BatchReport::from_results(results);
        info!(
            "Batch of {} done: {} succeeded, {} failed, {} to redeliver",
            batch.len(),
            report.processed,
            report.failed,
            report.redeliver.len()
        );
        report
    }

    async fn handle(&self, message: &RawMessage) -> MessageResult {
        let span = info_span!("message", message_id = %message.message_id);
        async {
            let parsed = IngestionMessage::parse(&message.body);
            let job_id = parsed
                .as_ref()
                .ok()
                .and_then(|m| m.job_id().map(str::to_string));

            let request = match parsed.and_then(IngestionMessage::into_request) {
                Ok(request) => request,
                Err(e) => {
                    warn!("Rejecting message {}: {}", message.message_id, e);
                    return MessageResult::failure(
                        &message.message_id,
                        job_id.as_deref(),
                        e.to_string(),
                        "validation",
                    );
                }
            };

            let job_id = request.key.job_id.clone();
            match self.processor.process(&request).await {
                Ok(JobOutcome::Completed(_)) => MessageResult::success(&message.message_id, &job_id),
                Ok(JobOutcome::AlreadyTerminal(status)) => {
                    info!("Redelivered message {} for {} job {}", message.message_id, status, job_id);
                    MessageResult::success(&message.message_id, &job_id)
                }
                Err(e) => {
                    error!(
                        job_id = %job_id,
                        message_id = %message.message_id,
                        kind = e.kind().as_str(),
                        "Job processing failed: {}",
                        e
                    );
                    self.mark_failed(&request.key, &e).await;
                    MessageResult::failure(&message.message_id, Some(&job_id), e.to_string(), e.kind().as_str())
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Best effort: a store that is down cannot record its own failure.
    async fn mark_failed(&self, key: &JobKey, error: &PipelineError) {
        if let Err(e) = self.store.patch(key, &JobPatch::failed(&error.to_string())).await {
            warn!("Could not record failure of {}: {}", key, e);
        }
    }
}
