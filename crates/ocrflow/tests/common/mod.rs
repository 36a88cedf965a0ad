//! Shared fakes and builders for ocrflow integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use ocrflow::clock::ManualClock;
use ocrflow::error::FetchError;
use ocrflow::pipeline::{Orchestrator, PipelineConfig};
use ocrflow::queue::{QueueConsumer, RawMessage};
use ocrflow::recognition::{
    PollResponse, RecognitionError, RecognitionHandle, RecognitionMode, TextBlock, TextRecognizer,
};
use ocrflow::storage::{FetchedObject, MemoryObjectStore, ObjectRef, SourceFetcher};
use ocrflow::store::MemoryJobStore;

/// What the fake service eventually answers for one object key.
#[derive(Clone)]
pub enum Script {
    Lines(Vec<(&'static str, f64)>),
    Fail(&'static str),
    /// Stays `IN_PROGRESS` forever.
    Stall,
}

/// Recognition service double. Each job answers `IN_PROGRESS` once and then
/// whatever its script says. Keys without a script get one default line.
#[derive(Default)]
pub struct ScriptedRecognizer {
    scripts: Mutex<HashMap<String, Script>>,
    polls: Mutex<HashMap<String, u32>>,
    submitted: Mutex<Vec<String>>,
}

impl ScriptedRecognizer {
    pub fn script(&self, key: &str, script: Script) {
        self.scripts.lock().unwrap().insert(key.to_string(), script);
    }

    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextRecognizer for ScriptedRecognizer {
    async fn submit(
        &self,
        object: &ObjectRef,
        _mode: RecognitionMode,
    ) -> Result<RecognitionHandle, RecognitionError> {
        self.submitted.lock().unwrap().push(object.key.clone());
        Ok(RecognitionHandle(object.key.clone()))
    }

    async fn poll(&self, handle: &RecognitionHandle) -> Result<PollResponse, RecognitionError> {
        let count = {
            let mut polls = self.polls.lock().unwrap();
            let count = polls.entry(handle.0.clone()).or_insert(0);
            *count += 1;
            *count
        };
        if count == 1 {
            return Ok(PollResponse::in_progress());
        }

        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(handle.as_str())
            .cloned()
            .unwrap_or_else(|| Script::Lines(vec![("Scanned page text", 95.0)]));

        Ok(match script {
            Script::Lines(lines) => PollResponse::succeeded(
                lines.iter().map(|(text, conf)| TextBlock::line(text, *conf)).collect(),
            ),
            Script::Fail(reason) => PollResponse::failed(reason),
            Script::Stall => PollResponse::in_progress(),
        })
    }
}

/// Every download fails with 404.
pub struct NoFetcher;

#[async_trait]
impl SourceFetcher for NoFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedObject, FetchError> {
        Err(FetchError::Status {
            url: url.to_string(),
            status: 404,
        })
    }
}

/// A full pipeline over in-memory collaborators and a virtual clock.
pub struct TestPipeline {
    pub store: Arc<MemoryJobStore>,
    pub objects: Arc<MemoryObjectStore>,
    pub recognizer: Arc<ScriptedRecognizer>,
    pub clock: Arc<ManualClock>,
    pub consumer: QueueConsumer,
}

impl TestPipeline {
    pub fn new() -> Self {
        let store = Arc::new(MemoryJobStore::new());
        let objects = Arc::new(MemoryObjectStore::new());
        let recognizer = Arc::new(ScriptedRecognizer::default());
        let clock = Arc::new(ManualClock::new());

        let orchestrator = Orchestrator::new(
            Arc::new(PipelineConfig::default()),
            store.clone(),
            objects.clone(),
            Arc::new(NoFetcher),
            recognizer.clone(),
            clock.clone(),
        );
        let consumer = QueueConsumer::new(Arc::new(orchestrator), store.clone(), 4);

        Self {
            store,
            objects,
            recognizer,
            clock,
            consumer,
        }
    }

    /// Puts a source image into object storage.
    pub fn upload(&self, key: &str) {
        self.objects.insert(ObjectRef::new("bucket", key), b"\xff\xd8\xff\xe0 image");
    }
}

/// An ingestion message for `key` in the test bucket.
pub fn ingestion_message(message_id: &str, job_id: &str, key: &str) -> RawMessage {
    let body = serde_json::json!({
        "job_id": job_id,
        "created_at": "t1",
        "source_location": { "bucket": "bucket", "key": key },
        "user_id": "u1",
        "filename": key,
    });
    RawMessage::new(message_id, body.to_string())
}
