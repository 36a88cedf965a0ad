//! Partial job updates with field-level merge semantics.

use super::model::{JobRecord, JobStatus};

/// A set of job fields to write. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub user_id: Option<String>,
    pub filename: Option<String>,
    pub status: Option<JobStatus>,
    pub processing_stage: Option<String>,
    pub group_id: Option<String>,
    pub page_number: Option<u32>,
    pub source_container: Option<String>,
    pub source_key: Option<String>,
    pub file_size: Option<u64>,
    pub mime_type: Option<String>,
    pub recognition_handle: Option<String>,
    pub extracted_text: Option<String>,
    pub corrected_text: Option<String>,
    pub confidence_score: Option<f64>,
    pub correction_confidence: Option<f64>,
    pub combined_confidence: Option<f64>,
    pub corrections_applied: Option<u32>,
    pub correction_model: Option<String>,
    pub document_type: Option<String>,
    pub error: Option<String>,
}

/// Result of applying a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The patch was merged into the stored record.
    Applied,
    /// The stored record is already terminal; nothing was written.
    Terminal(JobStatus),
}

impl JobPatch {
    /// Patch that moves the job to `status` and records a stage marker.
    pub fn stage(status: JobStatus, stage: &str) -> Self {
        Self {
            status: Some(status),
            processing_stage: Some(stage.to_string()),
            ..Self::default()
        }
    }

    /// Patch that marks the job failed with the given error.
    pub fn failed(error: &str) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            processing_stage: Some(crate::pipeline::stage::FAILED.to_string()),
            error: Some(error.to_string()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Merges the supplied fields into `record` and stamps `updated_at`.
    /// Terminal transitions also stamp `completed_at`.
    pub fn apply_to(&self, record: &mut JobRecord, now: &str) {
        fn merge<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if let Some(v) = value {
                *slot = Some(v.clone());
            }
        }

        merge(&mut record.user_id, &self.user_id);
        merge(&mut record.filename, &self.filename);
        if let Some(status) = self.status {
            record.status = status;
            if status.is_terminal() {
                record.completed_at = Some(now.to_string());
            }
        }
        merge(&mut record.processing_stage, &self.processing_stage);
        merge(&mut record.group_id, &self.group_id);
        merge(&mut record.page_number, &self.page_number);
        merge(&mut record.source_container, &self.source_container);
        merge(&mut record.source_key, &self.source_key);
        merge(&mut record.file_size, &self.file_size);
        merge(&mut record.mime_type, &self.mime_type);
        merge(&mut record.recognition_handle, &self.recognition_handle);
        merge(&mut record.extracted_text, &self.extracted_text);
        merge(&mut record.corrected_text, &self.corrected_text);
        merge(&mut record.confidence_score, &self.confidence_score);
        merge(&mut record.correction_confidence, &self.correction_confidence);
        merge(&mut record.combined_confidence, &self.combined_confidence);
        merge(&mut record.corrections_applied, &self.corrections_applied);
        merge(&mut record.correction_model, &self.correction_model);
        merge(&mut record.document_type, &self.document_type);
        merge(&mut record.error, &self.error);
        record.updated_at = Some(now.to_string());
    }
}
