//! Ingestion message payloads and their validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::JobKey;
use crate::pipeline::{JobRequest, JobSettings};
use crate::storage::ObjectRef;

/// A message as delivered by the queue: an id plus an unparsed JSON body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    pub message_id: String,
    pub body: String,
}

impl RawMessage {
    pub fn new(message_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            body: body.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Message body is not valid JSON: {0}")]
    Malformed(String),

    #[error("Missing required field '{0}'")]
    MissingField(&'static str),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    #[serde(default, alias = "bucket", skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Queue payload naming one job to process. Required fields are optional
/// here so that a missing one is reported by name instead of as a parse error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionMessage {
    #[serde(default, alias = "jobId", skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, alias = "createdAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, alias = "sourceLocation", skip_serializing_if = "Option::is_none")]
    pub source_location: Option<SourceLocation>,
    #[serde(default, alias = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, alias = "sourceUrl", skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, alias = "groupId", skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, alias = "pageNumber", skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<JobSettings>,
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ValidationError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(ValidationError::MissingField(field))
}

fn optional(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl IngestionMessage {
    pub fn parse(body: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(body).map_err(|e| ValidationError::Malformed(e.to_string()))
    }

    /// Job id if present, for reporting even when validation fails.
    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref().filter(|id| !id.trim().is_empty())
    }

    pub fn into_request(self) -> Result<JobRequest, ValidationError> {
        let job_id = required(self.job_id, "job_id")?;
        let created_at = required(self.created_at, "created_at")?;
        let location = self
            .source_location
            .ok_or(ValidationError::MissingField("source_location"))?;
        let container = required(location.container, "source_location.container")?;
        let key = required(location.key, "source_location.key")?;

        let group_id = optional(self.group_id);
        if group_id.is_some() && self.page_number.is_none() {
            return Err(ValidationError::MissingField("page_number"));
        }

        Ok(JobRequest {
            key: JobKey::new(job_id, created_at),
            source: ObjectRef::new(container, key),
            user_id: optional(self.user_id),
            filename: optional(self.filename),
            source_url: optional(self.source_url),
            group_id,
            page_number: self.page_number,
            settings: self.settings.unwrap_or_default(),
        })
    }
}
