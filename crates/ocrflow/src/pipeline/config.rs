use std::time::Duration;

use crate::config::Config;
use crate::correction::CorrectionOptions;
use crate::recognition::{PollPolicy, RecognitionMode};

pub struct PipelineConfig {
    /// Used when a message does not ask for a mode.
    pub recognition_mode: RecognitionMode,
    pub poll_policy: PollPolicy,
    /// Defaults that per-message settings override field by field.
    pub correction: CorrectionOptions,
    pub enhance: bool,
    /// Total attempts for source download and job submission.
    pub transient_attempts: u32,
    pub transient_retry_delay: Duration,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        let recognition = &config.recognition;
        Self {
            recognition_mode: recognition.mode,
            poll_policy: PollPolicy {
                max_wait: Duration::from_secs(recognition.max_wait_secs),
                transient_retry_delay: Duration::from_millis(recognition.transient_retry_ms),
                max_transient_errors: recognition.max_transient_errors,
            },
            correction: CorrectionOptions {
                preserve_case: config.correction.preserve_case,
                preserve_format: config.correction.preserve_format,
                aggressiveness: config.correction.aggressiveness,
            },
            enhance: config.correction.enhance,
            transient_attempts: recognition.transient_attempts,
            transient_retry_delay: Duration::from_millis(recognition.transient_retry_ms),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
