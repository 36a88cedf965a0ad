pub mod clock;
pub mod config;
pub mod correction;
pub mod db;
pub mod error;
pub mod job;
pub mod logging;
pub mod observer;
pub mod pipeline;
pub mod queue;
pub mod recognition;
pub mod secrets;
pub mod storage;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{load_config, Config};
pub use correction::{CorrectionEngine, CorrectionOptions, DocumentType};
pub use error::{ConfigError, FetchError, OcrflowError, Result, StorageError};
pub use job::{JobKey, JobPatch, JobRecord, JobStatus, PatchOutcome};
pub use observer::{JobObserver, ObservedDocument, ObserverEvent, ObserverHandle, ObserverSettings};
pub use pipeline::{JobOutcome, JobProcessor, JobRequest, Orchestrator, PipelineConfig, PipelineError};
pub use queue::{BatchReport, IngestionMessage, QueueConsumer, QueueWorker, RawMessage};
pub use recognition::{HttpRecognitionClient, RecognitionMode, TextRecognizer};
pub use secrets::{SecretError, SecretSources};
pub use storage::{FilesystemObjectStore, ObjectRef, ObjectStore};
pub use store::{JobQuery, JobStore, MemoryJobStore, RetryingJobStore, SqliteJobStore};
