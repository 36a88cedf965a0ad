//! Queue Consumer: turns batches of ingestion messages into orchestrator
//! runs and reports which messages need redelivery.

pub mod consumer;
pub mod message;
pub mod source;
pub mod worker;

pub use consumer::{BatchReport, MessageResult, QueueConsumer};
pub use message::{IngestionMessage, RawMessage, SourceLocation, ValidationError};
pub use source::{MemoryQueue, MessageSource, QueueError};
pub use worker::{QueueWorker, WorkerStats};
