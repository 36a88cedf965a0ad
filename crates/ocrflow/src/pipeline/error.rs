use thiserror::Error;

use crate::error::{FetchError, StorageError};
use crate::recognition::{PollError, RecognitionError};
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Source object {object} does not exist and no source URL was given")]
    SourceUnavailable { object: String },

    #[error("Source download failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Object storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Recognition submission failed: {0}")]
    Submission(RecognitionError),

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),
}

/// Failure classes operators need to tell apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; retrying cannot help.
    Validation,
    /// Infrastructure hiccup that outlasted local retries.
    Transient,
    /// The recognition service said no.
    ExternalService,
    /// We gave up waiting.
    Timeout,
    Persistence,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Transient => "transient",
            ErrorKind::ExternalService => "external_service",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Persistence => "persistence",
        }
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::SourceUnavailable { .. } => ErrorKind::Validation,
            PipelineError::Fetch(e) if e.is_transient() => ErrorKind::Transient,
            PipelineError::Fetch(_) => ErrorKind::ExternalService,
            PipelineError::Storage(_) => ErrorKind::Transient,
            PipelineError::Submission(e) if e.is_transient() => ErrorKind::Transient,
            PipelineError::Submission(_) => ErrorKind::ExternalService,
            PipelineError::Poll(PollError::TimedOut { .. }) => ErrorKind::Timeout,
            PipelineError::Poll(PollError::TransientExhausted { .. }) => ErrorKind::Transient,
            PipelineError::Poll(_) => ErrorKind::ExternalService,
            PipelineError::Persistence(_) => ErrorKind::Persistence,
        }
    }
}
