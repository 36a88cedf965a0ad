use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::clock::Clock;
use crate::correction::{CorrectedDocument, CorrectionEngine, DocumentType};
use crate::error::{FetchError, StorageError};
use crate::job::{JobKey, JobPatch, JobStatus, PatchOutcome};
use crate::recognition::{PollError, Poller, RecognitionError, RecognitionHandle, RecognizedText, TextRecognizer};
use crate::storage::{guess_mime_type, ObjectRef, ObjectStore, SourceFetcher};
use crate::store::{JobStore, StoreError};

use super::config::PipelineConfig;
use super::context::{JobRequest, PipelineContext};
use super::error::PipelineError;
use super::stage;

/// Weighted blend of recognition confidence (0 to 100) and correction
/// confidence (0 to 1), on a 0 to 1 scale.
pub fn combined_confidence(extraction: f64, correction: f64) -> f64 {
    (extraction * 0.7 + correction * 100.0 * 0.3) / 100.0
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobSummary {
    pub document_type: DocumentType,
    pub line_count: usize,
    pub extraction_confidence: f64,
    pub correction_confidence: f64,
    pub combined_confidence: f64,
    pub corrections_applied: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(JobSummary),
    /// The job was already completed or failed; nothing was redone.
    AlreadyTerminal(JobStatus),
}

/// Something that can take a job request to a terminal state.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, request: &JobRequest) -> Result<JobOutcome, PipelineError>;
}

/// Why a run stopped before reaching the end.
enum Halt {
    /// Another writer already finalized the job.
    Terminal(JobStatus),
    Failed(PipelineError),
}

impl From<PipelineError> for Halt {
    fn from(error: PipelineError) -> Self {
        Halt::Failed(error)
    }
}

impl From<StoreError> for Halt {
    fn from(error: StoreError) -> Self {
        Halt::Failed(error.into())
    }
}

impl From<StorageError> for Halt {
    fn from(error: StorageError) -> Self {
        Halt::Failed(error.into())
    }
}

impl From<FetchError> for Halt {
    fn from(error: FetchError) -> Self {
        Halt::Failed(error.into())
    }
}

impl From<PollError> for Halt {
    fn from(error: PollError) -> Self {
        Halt::Failed(error.into())
    }
}

/// Runs `op` up to `attempts` times, sleeping `delay` after each transient failure.
async fn retry_transient<T, E, F, Fut>(
    clock: &dyn Clock,
    attempts: u32,
    delay: Duration,
    what: &str,
    is_transient: fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts && is_transient(&e) => {
                warn!("{} attempt {}/{} failed, retrying: {}", what, attempt, attempts, e);
                clock.sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Drives one job from `pending`/`queued` to `completed` or `failed`,
/// writing a stage marker to the store at every step boundary.
pub struct Orchestrator {
    config: Arc<PipelineConfig>,
    store: Arc<dyn JobStore>,
    objects: Arc<dyn ObjectStore>,
    fetcher: Arc<dyn SourceFetcher>,
    recognizer: Arc<dyn TextRecognizer>,
    engine: CorrectionEngine,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<PipelineConfig>,
        store: Arc<dyn JobStore>,
        objects: Arc<dyn ObjectStore>,
        fetcher: Arc<dyn SourceFetcher>,
        recognizer: Arc<dyn TextRecognizer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let engine = CorrectionEngine::new(config.enhance);
        Self {
            config,
            store,
            objects,
            fetcher,
            recognizer,
            engine,
            clock,
        }
    }

    /// Run the full pipeline for one job. On failure the job is marked
    /// `failed` (best effort) and the error is returned.
    pub async fn run(&self, request: &JobRequest) -> Result<JobOutcome, PipelineError> {
        let span = info_span!("job",
            job_id = %request.key.job_id,
            created_at = %request.key.created_at,
        );

        async {
            let mut ctx = PipelineContext::new(request.clone(), &self.config);
            match self.drive(&mut ctx).await {
                Ok(outcome) => Ok(outcome),
                Err(Halt::Terminal(status)) => {
                    info!("Job is already {}, skipping", status);
                    Ok(JobOutcome::AlreadyTerminal(status))
                }
                Err(Halt::Failed(error)) => {
                    warn!(
                        kind = error.kind().as_str(),
                        stage = ctx.stage,
                        "Job failed: {}",
                        error
                    );
                    self.record_failure(ctx.key(), &error).await;
                    Err(error)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn record_failure(&self, key: &JobKey, error: &PipelineError) {
        match self.store.patch(key, &JobPatch::failed(&error.to_string())).await {
            Ok(_) => {}
            Err(e) => warn!("Could not mark {} failed: {}", key, e),
        }
    }

    async fn drive(&self, ctx: &mut PipelineContext) -> Result<JobOutcome, Halt> {
        if let Some(existing) = self.store.get(ctx.key()).await? {
            if existing.status.is_terminal() {
                return Err(Halt::Terminal(existing.status));
            }
        }

        self.step_begin(ctx).await?;

        let object = self
            .step_resolve_source(ctx)
            .instrument(info_span!("resolve_source"))
            .await?;

        let handle = self
            .step_submit(ctx, &object)
            .instrument(info_span!("submit"))
            .await?;

        let recognized = self
            .step_poll(&handle)
            .instrument(info_span!("poll", handle = %handle))
            .await?;

        let document = self
            .step_correct(ctx, &recognized)
            .instrument(info_span!("correct"))
            .await?;

        self.step_complete(ctx, &recognized, &document).await
    }

    async fn write(&self, key: &JobKey, patch: JobPatch) -> Result<(), Halt> {
        match self.store.patch(key, &patch).await? {
            PatchOutcome::Applied => Ok(()),
            PatchOutcome::Terminal(status) => Err(Halt::Terminal(status)),
        }
    }

    async fn enter_stage(
        &self,
        ctx: &mut PipelineContext,
        status: JobStatus,
        stage: &'static str,
    ) -> Result<(), Halt> {
        ctx.stage = stage;
        self.write(ctx.key(), JobPatch::stage(status, stage)).await
    }

    // ─── Steps ───

    async fn step_begin(&self, ctx: &mut PipelineContext) -> Result<(), Halt> {
        let request = &ctx.request;
        let patch = JobPatch {
            user_id: request.user_id.clone(),
            filename: request.filename.clone(),
            group_id: request.group_id.clone(),
            page_number: request.page_number,
            source_container: Some(request.source.container.clone()),
            source_key: Some(request.source.key.clone()),
            ..JobPatch::stage(JobStatus::Processing, stage::AI_ENHANCED_PROCESSING)
        };
        ctx.stage = stage::AI_ENHANCED_PROCESSING;
        self.write(ctx.key(), patch).await
    }

    async fn step_resolve_source(&self, ctx: &mut PipelineContext) -> Result<ObjectRef, Halt> {
        let source = ctx.request.source.clone();
        if self.objects.exists(&source).await? {
            debug!("Source {} already stored", source);
            return Ok(source);
        }

        let Some(url) = ctx.request.source_url.clone() else {
            return Err(PipelineError::SourceUnavailable {
                object: source.to_string(),
            }
            .into());
        };

        self.enter_stage(ctx, JobStatus::Processing, stage::DOWNLOADING_IMAGE)
            .await?;

        let fetched = retry_transient(
            self.clock.as_ref(),
            self.config.transient_attempts,
            self.config.transient_retry_delay,
            "Source download",
            FetchError::is_transient,
            || self.fetcher.fetch(&url),
        )
        .await?;

        let mime_type = guess_mime_type(&source.key).or(fetched.content_type);
        self.objects
            .put(&source, &fetched.bytes, mime_type.as_deref())
            .await?;
        info!("Stored {} bytes from source URL as {}", fetched.bytes.len(), source);

        let patch = JobPatch {
            file_size: Some(fetched.bytes.len() as u64),
            mime_type,
            ..JobPatch::default()
        };
        self.write(ctx.key(), patch).await?;
        Ok(source)
    }

    async fn step_submit(
        &self,
        ctx: &mut PipelineContext,
        object: &ObjectRef,
    ) -> Result<RecognitionHandle, Halt> {
        self.enter_stage(ctx, JobStatus::Processing, stage::TEXT_RECOGNITION)
            .await?;

        let mode = ctx.mode;
        let handle = retry_transient(
            self.clock.as_ref(),
            self.config.transient_attempts,
            self.config.transient_retry_delay,
            "Recognition submit",
            RecognitionError::is_transient,
            || self.recognizer.submit(object, mode),
        )
        .await
        .map_err(PipelineError::Submission)?;
        info!("Submitted {} for recognition as {}", object, handle);

        // durable before polling starts, so a crash leaves a reconcilable handle
        let patch = JobPatch {
            recognition_handle: Some(handle.as_str().to_string()),
            ..JobPatch::default()
        };
        self.write(ctx.key(), patch).await?;
        Ok(handle)
    }

    async fn step_poll(&self, handle: &RecognitionHandle) -> Result<RecognizedText, Halt> {
        let poller = Poller::new(
            self.recognizer.as_ref(),
            self.clock.as_ref(),
            self.config.poll_policy.clone(),
        );
        let blocks = poller.wait_for(handle).await?;
        let recognized = RecognizedText::from_blocks(&blocks);
        info!(
            "Recognized {} lines (confidence {:.1})",
            recognized.line_count, recognized.confidence
        );
        Ok(recognized)
    }

    async fn step_correct(
        &self,
        ctx: &mut PipelineContext,
        recognized: &RecognizedText,
    ) -> Result<CorrectedDocument, Halt> {
        ctx.stage = stage::AI_CORRECTION;
        let patch = JobPatch {
            extracted_text: Some(recognized.text.clone()),
            confidence_score: Some(recognized.confidence),
            ..JobPatch::stage(JobStatus::AiCorrection, stage::AI_CORRECTION)
        };
        self.write(ctx.key(), patch).await?;

        let document = self.engine.correct_document(
            &recognized.text,
            ctx.request.filename.as_deref(),
            &ctx.correction,
        );
        debug!(
            "Corrected as {} with {} change(s)",
            document.document_type, document.outcome.corrections_applied
        );
        Ok(document)
    }

    async fn step_complete(
        &self,
        ctx: &mut PipelineContext,
        recognized: &RecognizedText,
        document: &CorrectedDocument,
    ) -> Result<JobOutcome, Halt> {
        let outcome = &document.outcome;
        let combined = combined_confidence(recognized.confidence, outcome.confidence);

        ctx.stage = stage::COMPLETED;
        let patch = JobPatch {
            extracted_text: Some(recognized.text.clone()),
            corrected_text: Some(outcome.corrected.clone()),
            confidence_score: Some(recognized.confidence),
            correction_confidence: Some(outcome.confidence),
            combined_confidence: Some(combined),
            corrections_applied: Some(outcome.corrections_applied),
            correction_model: Some(outcome.model_identifier.clone()),
            document_type: Some(document.document_type.as_str().to_string()),
            ..JobPatch::stage(JobStatus::Completed, stage::COMPLETED)
        };
        self.write(ctx.key(), patch).await?;
        info!("Job completed as {} (combined confidence {:.2})", document.document_type, combined);

        Ok(JobOutcome::Completed(JobSummary {
            document_type: document.document_type,
            line_count: recognized.line_count,
            extraction_confidence: recognized.confidence,
            correction_confidence: outcome.confidence,
            combined_confidence: combined,
            corrections_applied: outcome.corrections_applied,
        }))
    }
}

#[async_trait]
impl JobProcessor for Orchestrator {
    async fn process(&self, request: &JobRequest) -> Result<JobOutcome, PipelineError> {
        self.run(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::FetchError;
    use crate::job::JobRecord;
    use crate::pipeline::ErrorKind;
    use crate::recognition::{PollResponse, RecognitionMode, TextBlock};
    use crate::storage::{FetchedObject, MemoryObjectStore};
    use crate::store::{JobQuery, MemoryJobStore};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct FakeRecognizer {
        submits: Mutex<Vec<RecognitionMode>>,
        polls: Mutex<VecDeque<Result<PollResponse, RecognitionError>>>,
    }

    impl FakeRecognizer {
        fn new(polls: Vec<Result<PollResponse, RecognitionError>>) -> Self {
            Self {
                submits: Mutex::new(Vec::new()),
                polls: Mutex::new(polls.into()),
            }
        }

        fn succeeding(lines: &[(&str, f64)]) -> Self {
            let blocks = lines.iter().map(|(t, c)| TextBlock::line(t, *c)).collect();
            Self::new(vec![
                Ok(PollResponse::in_progress()),
                Ok(PollResponse::succeeded(blocks)),
            ])
        }

        fn submit_count(&self) -> usize {
            self.submits.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl TextRecognizer for FakeRecognizer {
        async fn submit(
            &self,
            _object: &ObjectRef,
            mode: RecognitionMode,
        ) -> Result<RecognitionHandle, RecognitionError> {
            let mut submits = self.submits.lock().unwrap();
            submits.push(mode);
            Ok(RecognitionHandle(format!("h-{}", submits.len())))
        }

        async fn poll(&self, _handle: &RecognitionHandle) -> Result<PollResponse, RecognitionError> {
            self.polls
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(PollResponse::in_progress()))
        }
    }

    struct FakeFetcher {
        responses: Mutex<VecDeque<Result<FetchedObject, FetchError>>>,
    }

    impl FakeFetcher {
        fn new(responses: Vec<Result<FetchedObject, FetchError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
            }
        }
    }

    #[async_trait]
    impl SourceFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedObject, FetchError> {
            self.responses.lock().unwrap().pop_front().unwrap_or_else(|| {
                Err(FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                })
            })
        }
    }

    struct Harness {
        store: Arc<MemoryJobStore>,
        objects: Arc<MemoryObjectStore>,
        recognizer: Arc<FakeRecognizer>,
        clock: Arc<ManualClock>,
        orchestrator: Orchestrator,
    }

    fn harness(recognizer: FakeRecognizer, fetcher: FakeFetcher) -> Harness {
        let store = Arc::new(MemoryJobStore::new());
        let objects = Arc::new(MemoryObjectStore::new());
        let recognizer = Arc::new(recognizer);
        let clock = Arc::new(ManualClock::new());
        let orchestrator = Orchestrator::new(
            Arc::new(PipelineConfig::default()),
            store.clone(),
            objects.clone(),
            Arc::new(fetcher),
            recognizer.clone(),
            clock.clone(),
        );
        Harness {
            store,
            objects,
            recognizer,
            clock,
            orchestrator,
        }
    }

    fn request() -> JobRequest {
        let mut request = JobRequest::new(JobKey::new("j1", "t1"), ObjectRef::new("bucket", "a.jpg"));
        request.user_id = Some("u1".to_string());
        request.filename = Some("a.jpg".to_string());
        request
    }

    async fn stored(h: &Harness) -> JobRecord {
        h.store.get(&JobKey::new("j1", "t1")).await.unwrap().unwrap()
    }

    #[test]
    fn test_combined_confidence_formula() {
        assert!((combined_confidence(90.0, 0.8) - 0.87).abs() < 1e-9);
        assert_eq!(combined_confidence(0.0, 0.0), 0.0);
        assert!((combined_confidence(100.0, 1.0) - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_happy_path_completes_job() {
        let h = harness(FakeRecognizer::succeeding(&[("Hello world", 90.0)]), FakeFetcher::new(vec![]));
        h.objects.insert(ObjectRef::new("bucket", "a.jpg"), b"jpeg");

        let outcome = h.orchestrator.run(&request()).await.unwrap();
        let JobOutcome::Completed(summary) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(summary.document_type, DocumentType::General);
        assert_eq!(summary.line_count, 1);

        let record = stored(&h).await;
        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.processing_stage.as_deref(), Some(stage::COMPLETED));
        assert_eq!(record.extracted_text.as_deref(), Some("Hello world"));
        assert_eq!(record.corrected_text.as_deref(), Some("Hello world"));
        assert_eq!(record.document_type.as_deref(), Some("general"));
        assert_eq!(record.recognition_handle.as_deref(), Some("h-1"));
        assert_eq!(record.user_id.as_deref(), Some("u1"));
        assert_eq!(record.confidence_score, Some(90.0));
        assert_eq!(record.correction_model.as_deref(), Some("rules-v1"));
        assert!(record.completed_at.is_some());
        assert!(record.error.is_none());

        let expected = combined_confidence(90.0, 0.98);
        assert!((record.combined_confidence.unwrap() - expected).abs() < 1e-9);
        assert_eq!(h.clock.sleeps(), vec![Duration::from_millis(500)]);
    }

    #[tokio::test]
    async fn test_redelivery_after_completion_is_noop() {
        let h = harness(FakeRecognizer::succeeding(&[("Hello", 90.0)]), FakeFetcher::new(vec![]));
        h.objects.insert(ObjectRef::new("bucket", "a.jpg"), b"jpeg");

        h.orchestrator.run(&request()).await.unwrap();
        let first = stored(&h).await;

        let outcome = h.orchestrator.run(&request()).await.unwrap();
        assert_eq!(outcome, JobOutcome::AlreadyTerminal(JobStatus::Completed));
        assert_eq!(stored(&h).await, first);
        assert_eq!(h.recognizer.submit_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_source_fails_job() {
        let h = harness(FakeRecognizer::succeeding(&[]), FakeFetcher::new(vec![]));

        let err = h.orchestrator.run(&request()).await.unwrap_err();
        assert!(matches!(err, PipelineError::SourceUnavailable { .. }));

        let record = stored(&h).await;
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.processing_stage.as_deref(), Some(stage::FAILED));
        assert!(record.error.unwrap().contains("bucket/a.jpg"));
        assert_eq!(h.recognizer.submit_count(), 0);
    }

    #[tokio::test]
    async fn test_source_url_is_downloaded_and_recorded() {
        let fetcher = FakeFetcher::new(vec![
            Err(FetchError::Request {
                url: "http://img/a.jpg".to_string(),
                message: "connection reset".to_string(),
            }),
            Ok(FetchedObject {
                bytes: vec![1, 2, 3, 4],
                content_type: Some("image/png".to_string()),
            }),
        ]);
        let h = harness(FakeRecognizer::succeeding(&[("Hi", 80.0)]), fetcher);

        let mut req = request();
        req.source_url = Some("http://img/a.jpg".to_string());
        h.orchestrator.run(&req).await.unwrap();

        let source = ObjectRef::new("bucket", "a.jpg");
        assert!(h.objects.exists(&source).await.unwrap());
        assert_eq!(h.objects.content_type(&source).as_deref(), Some("image/jpeg"));

        let record = stored(&h).await;
        assert_eq!(record.file_size, Some(4));
        assert_eq!(record.mime_type.as_deref(), Some("image/jpeg"));
        assert_eq!(h.clock.sleeps()[0], Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_service_failure_keeps_handle_and_fails_job() {
        let recognizer = FakeRecognizer::new(vec![Ok(PollResponse::failed("unreadable image"))]);
        let h = harness(recognizer, FakeFetcher::new(vec![]));
        h.objects.insert(ObjectRef::new("bucket", "a.jpg"), b"jpeg");

        let err = h.orchestrator.run(&request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalService);

        let record = stored(&h).await;
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.recognition_handle.as_deref(), Some("h-1"));
        assert!(record.error.unwrap().contains("unreadable image"));
    }

    #[tokio::test]
    async fn test_stuck_recognition_times_out() {
        let h = harness(FakeRecognizer::new(vec![]), FakeFetcher::new(vec![]));
        h.objects.insert(ObjectRef::new("bucket", "a.jpg"), b"jpeg");

        let err = h.orchestrator.run(&request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(h.clock.elapsed() >= Duration::from_secs(180));

        let record = stored(&h).await;
        assert_eq!(record.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_already_failed_job_is_not_reprocessed() {
        let h = harness(FakeRecognizer::succeeding(&[("x", 1.0)]), FakeFetcher::new(vec![]));
        let mut record = JobRecord::new("j1", "t1");
        record.status = JobStatus::Failed;
        record.error = Some("earlier failure".to_string());
        h.store.insert(record.clone());

        let outcome = h.orchestrator.run(&request()).await.unwrap();
        assert_eq!(outcome, JobOutcome::AlreadyTerminal(JobStatus::Failed));
        assert_eq!(stored(&h).await, record);
        assert_eq!(h.recognizer.submit_count(), 0);
    }

    #[tokio::test]
    async fn test_message_mode_reaches_recognizer() {
        let h = harness(FakeRecognizer::succeeding(&[("x", 50.0)]), FakeFetcher::new(vec![]));
        h.objects.insert(ObjectRef::new("bucket", "a.jpg"), b"jpeg");

        let mut req = request();
        req.settings.mode = Some(RecognitionMode::DocumentAnalysis);
        h.orchestrator.run(&req).await.unwrap();

        assert_eq!(
            *h.recognizer.submits.lock().unwrap(),
            vec![RecognitionMode::DocumentAnalysis]
        );
    }
}
