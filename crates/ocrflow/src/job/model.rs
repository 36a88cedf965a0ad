//! Job data model shared by the pipeline, the store and the observer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a job.
///
/// `pending → queued → processing → ai_correction → completed`, with `failed`
/// reachable from any non-terminal status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Queued,
    Processing,
    AiCorrection,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::AiCorrection => "ai_correction",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Returns true for `completed` and `failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Returns true while the pipeline is actively working on the job.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Processing | JobStatus::AiCorrection)
    }

    /// Returns true while the job waits for a worker.
    pub fn is_waiting(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Queued)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "ai_correction" => Ok(JobStatus::AiCorrection),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// Composite primary key of a job. `created_at` never changes after creation,
/// so every lookup and update carries both parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobKey {
    pub job_id: String,
    pub created_at: String,
}

impl JobKey {
    pub fn new(job_id: impl Into<String>, created_at: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            created_at: created_at.into(),
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.job_id, self.created_at)
    }
}

/// A stored job, one page or image of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    /// Opaque unique job identifier.
    pub job_id: String,
    /// Creation timestamp, second half of the primary key.
    pub created_at: String,
    /// Owner of the job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Original filename of the uploaded image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub status: JobStatus,
    /// Free-form progress marker within `processing`, for display only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_stage: Option<String>,
    /// Set when this job is one page of a multi-page document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Position within the group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_container: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_key: Option<String>,
    /// Size in bytes of the resolved source object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Handle of the external recognition job, persisted right after submission.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recognition_handle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrected_text: Option<String>,
    /// Recognition confidence, 0 to 100.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    /// Correction confidence, 0 to 1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correction_confidence: Option<f64>,
    /// Weighted blend of both confidences, 0 to 1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combined_confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrections_applied: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correction_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl JobRecord {
    /// Creates a fresh `pending` job with no content.
    pub fn new(job_id: impl Into<String>, created_at: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            created_at: created_at.into(),
            user_id: None,
            filename: None,
            status: JobStatus::Pending,
            processing_stage: None,
            group_id: None,
            page_number: None,
            source_container: None,
            source_key: None,
            file_size: None,
            mime_type: None,
            recognition_handle: None,
            extracted_text: None,
            corrected_text: None,
            confidence_score: None,
            correction_confidence: None,
            combined_confidence: None,
            corrections_applied: None,
            correction_model: None,
            document_type: None,
            error: None,
            updated_at: None,
            completed_at: None,
        }
    }

    pub fn key(&self) -> JobKey {
        JobKey::new(&self.job_id, &self.created_at)
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// Confidence used for display and group aggregation, normalized to 0..1.
    /// Prefers the combined score and falls back to recognition confidence.
    pub fn display_confidence(&self) -> Option<f64> {
        self.combined_confidence
            .or_else(|| self.confidence_score.map(|c| c / 100.0))
    }
}
