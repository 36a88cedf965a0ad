use serde::{Deserialize, Serialize};

use crate::correction::{Aggressiveness, CorrectionOptions};
use crate::job::JobKey;
use crate::recognition::RecognitionMode;
use crate::storage::ObjectRef;

use super::config::PipelineConfig;
use super::stage;

/// Caller-supplied overrides carried on an ingestion message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<RecognitionMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preserve_case: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preserve_format: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggressiveness: Option<Aggressiveness>,
}

impl JobSettings {
    pub fn correction_options(&self, defaults: &CorrectionOptions) -> CorrectionOptions {
        CorrectionOptions {
            preserve_case: self.preserve_case.unwrap_or(defaults.preserve_case),
            preserve_format: self.preserve_format.unwrap_or(defaults.preserve_format),
            aggressiveness: self.aggressiveness.unwrap_or(defaults.aggressiveness),
        }
    }
}

/// A validated request to process one job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub key: JobKey,
    pub source: ObjectRef,
    pub user_id: Option<String>,
    pub filename: Option<String>,
    pub source_url: Option<String>,
    pub group_id: Option<String>,
    pub page_number: Option<u32>,
    pub settings: JobSettings,
}

impl JobRequest {
    pub fn new(key: JobKey, source: ObjectRef) -> Self {
        Self {
            key,
            source,
            user_id: None,
            filename: None,
            source_url: None,
            group_id: None,
            page_number: None,
            settings: JobSettings::default(),
        }
    }
}

pub struct PipelineContext {
    // Input
    pub request: JobRequest,

    // Effective settings after message overrides
    pub mode: RecognitionMode,
    pub correction: CorrectionOptions,

    // Last stage marker written; reported when a step fails
    pub stage: &'static str,
}

impl PipelineContext {
    pub fn new(request: JobRequest, config: &PipelineConfig) -> Self {
        let mode = request.settings.mode.unwrap_or(config.recognition_mode);
        let correction = request.settings.correction_options(&config.correction);
        Self {
            request,
            mode,
            correction,
            stage: stage::AI_ENHANCED_PROCESSING,
        }
    }

    pub fn key(&self) -> &JobKey {
        &self.request.key
    }
}
