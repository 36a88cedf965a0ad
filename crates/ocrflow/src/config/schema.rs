use serde::{Deserialize, Serialize};

use crate::correction::Aggressiveness;
use crate::recognition::RecognitionMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub version: String,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_object_store_root")]
    pub object_store_root: String,
    /// Messages processed concurrently within one batch.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default)]
    pub recognition: RecognitionConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub correction: CorrectionConfig,
    #[serde(default)]
    pub observer: ObserverConfig,
    #[serde(default)]
    pub sweeper: SweeperConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn data_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("ocrflow")
}

fn default_database_path() -> String {
    data_dir().join("jobs.db").to_string_lossy().into_owned()
}

fn default_object_store_root() -> String {
    data_dir().join("objects").to_string_lossy().into_owned()
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            database_path: default_database_path(),
            object_store_root: default_object_store_root(),
            worker_count: default_worker_count(),
            recognition: RecognitionConfig::default(),
            persistence: PersistenceConfig::default(),
            correction: CorrectionConfig::default(),
            observer: ObserverConfig::default(),
            sweeper: SweeperConfig::default(),
            queue: QueueConfig::default(),
        }
    }
}

/// External text recognition service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// API key given inline. Prefer `api_key_file` or `api_key_env_var`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env_var: Option<String>,
    #[serde(default)]
    pub mode: RecognitionMode,
    /// Wall-clock ceiling for one recognition job.
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_transient_retry_ms")]
    pub transient_retry_ms: u64,
    /// Consecutive poll I/O failures tolerated before giving up.
    #[serde(default = "default_max_transient_errors")]
    pub max_transient_errors: u32,
    /// Attempts for source download and submission.
    #[serde(default = "default_transient_attempts")]
    pub transient_attempts: u32,
}

fn default_endpoint() -> String {
    "http://localhost:8080".to_string()
}

fn default_max_wait_secs() -> u64 {
    180
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_transient_retry_ms() -> u64 {
    1000
}

fn default_max_transient_errors() -> u32 {
    3
}

fn default_transient_attempts() -> u32 {
    3
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: None,
            api_key_file: None,
            api_key_env_var: None,
            mode: RecognitionMode::default(),
            max_wait_secs: default_max_wait_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            transient_retry_ms: default_transient_retry_ms(),
            max_transient_errors: default_max_transient_errors(),
            transient_attempts: default_transient_attempts(),
        }
    }
}

/// Retry of job store writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Attempt `n` is followed by a sleep of `n * base_delay_ms`.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionConfig {
    #[serde(default = "default_true")]
    pub preserve_case: bool,
    #[serde(default)]
    pub preserve_format: bool,
    #[serde(default)]
    pub aggressiveness: Aggressiveness,
    /// Run the document-type specific pass after the generic rules.
    #[serde(default = "default_true")]
    pub enhance: bool,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            preserve_case: true,
            preserve_format: false,
            aggressiveness: Aggressiveness::default(),
            enhance: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObserverConfig {
    #[serde(default = "default_processing_interval_ms")]
    pub processing_interval_ms: u64,
    #[serde(default = "default_pending_interval_ms")]
    pub pending_interval_ms: u64,
    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,
    #[serde(default = "default_max_idle_interval_ms")]
    pub max_idle_interval_ms: u64,
    #[serde(default = "default_idle_backoff_after")]
    pub idle_backoff_after: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
}

fn default_processing_interval_ms() -> u64 {
    1500
}

fn default_pending_interval_ms() -> u64 {
    3000
}

fn default_idle_interval_ms() -> u64 {
    30_000
}

fn default_max_idle_interval_ms() -> u64 {
    300_000
}

fn default_idle_backoff_after() -> u32 {
    5
}

fn default_page_size() -> u64 {
    100
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            processing_interval_ms: default_processing_interval_ms(),
            pending_interval_ms: default_pending_interval_ms(),
            idle_interval_ms: default_idle_interval_ms(),
            max_idle_interval_ms: default_max_idle_interval_ms(),
            idle_backoff_after: default_idle_backoff_after(),
            page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweeperConfig {
    /// Added on top of `recognition.maxWaitSecs` before a job counts as stale.
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
}

fn default_grace_secs() -> u64 {
    60
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            grace_secs: default_grace_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Deliveries before a failing message is dead-lettered.
    #[serde(default = "default_max_receives")]
    pub max_receives: u32,
    #[serde(default = "default_idle_delay_ms")]
    pub idle_delay_ms: u64,
}

fn default_batch_size() -> usize {
    10
}

fn default_max_receives() -> u32 {
    5
}

fn default_idle_delay_ms() -> u64 {
    1000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_receives: default_max_receives(),
            idle_delay_ms: default_idle_delay_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sections_default_when_missing() {
        let config: Config = serde_json::from_str(r#"{"version": "1.0"}"#).unwrap();
        assert_eq!(config.recognition.max_wait_secs, 180);
        assert_eq!(config.recognition.mode, RecognitionMode::TextDetection);
        assert_eq!(config.persistence.max_attempts, 3);
        assert!(config.correction.preserve_case);
        assert!(!config.correction.preserve_format);
        assert_eq!(config.observer.processing_interval_ms, 1500);
        assert_eq!(config.sweeper.grace_secs, 60);
        assert!(config.worker_count >= 1);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"version": "1.0", "recognition": {"mode": "document_analysis", "maxWaitSecs": 60}}"#,
        )
        .unwrap();
        assert_eq!(config.recognition.mode, RecognitionMode::DocumentAnalysis);
        assert_eq!(config.recognition.max_wait_secs, 60);
        assert_eq!(config.recognition.request_timeout_secs, 30);
        assert_eq!(config.recognition.transient_attempts, 3);
    }
}
