//! Text Recognition Client: submit an image to the external recognition
//! service and poll the returned handle until it settles.

pub mod http;
pub mod poller;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::ObjectRef;

pub use http::HttpRecognitionClient;
pub use poller::{backoff_delay, PollAction, PollError, PollEvent, PollMachine, PollPolicy, PollState, Poller};

/// Which service feature to request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionMode {
    /// Plain line and word detection.
    #[default]
    TextDetection,
    /// Richer layout analysis (forms, tables).
    DocumentAnalysis,
}

impl fmt::Display for RecognitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecognitionMode::TextDetection => write!(f, "text_detection"),
            RecognitionMode::DocumentAnalysis => write!(f, "document_analysis"),
        }
    }
}

/// Opaque handle of an external recognition job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecognitionHandle(pub String);

impl RecognitionHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecognitionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecognitionStatus {
    Succeeded,
    Failed,
    InProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockType {
    Page,
    Line,
    Word,
}

/// One block of recognized output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextBlock {
    pub block_type: BlockType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Confidence 0 to 100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl TextBlock {
    pub fn line(text: &str, confidence: f64) -> Self {
        Self {
            block_type: BlockType::Line,
            text: Some(text.to_string()),
            confidence: Some(confidence),
        }
    }
}

/// Status report for a recognition job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollResponse {
    pub status: RecognitionStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<TextBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PollResponse {
    pub fn in_progress() -> Self {
        Self {
            status: RecognitionStatus::InProgress,
            blocks: Vec::new(),
            reason: None,
        }
    }

    pub fn succeeded(blocks: Vec<TextBlock>) -> Self {
        Self {
            status: RecognitionStatus::Succeeded,
            blocks,
            reason: None,
        }
    }

    pub fn failed(reason: &str) -> Self {
        Self {
            status: RecognitionStatus::Failed,
            blocks: Vec::new(),
            reason: Some(reason.to_string()),
        }
    }
}

/// Text assembled from line blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedText {
    /// Line texts joined by newline, in source order.
    pub text: String,
    /// Mean confidence of the lines that reported one, 0 when none did.
    pub confidence: f64,
    pub line_count: usize,
}

impl RecognizedText {
    pub fn from_blocks(blocks: &[TextBlock]) -> Self {
        let lines: Vec<&TextBlock> = blocks
            .iter()
            .filter(|b| b.block_type == BlockType::Line && b.text.is_some())
            .collect();

        let text = lines
            .iter()
            .filter_map(|b| b.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n");

        let scores: Vec<f64> = lines.iter().filter_map(|b| b.confidence).collect();
        let confidence = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };

        Self {
            text,
            confidence,
            line_count: lines.len(),
        }
    }
}

#[derive(Error, Debug)]
pub enum RecognitionError {
    /// Network hiccup or server-side error; the same call may succeed later.
    #[error("Transient recognition service error: {0}")]
    Transient(String),

    /// The service does not know the handle; it will never become valid.
    #[error("Invalid recognition job handle: {0}")]
    InvalidHandle(String),

    /// The service refused the request.
    #[error("Recognition request rejected: {0}")]
    Rejected(String),

    #[error("Failed to decode recognition response: {0}")]
    Decode(String),

    #[error("Recognition client setup failed: {0}")]
    Client(String),
}

impl RecognitionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RecognitionError::Transient(_))
    }
}

#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn submit(
        &self,
        object: &ObjectRef,
        mode: RecognitionMode,
    ) -> Result<RecognitionHandle, RecognitionError>;

    async fn poll(&self, handle: &RecognitionHandle) -> Result<PollResponse, RecognitionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognized_text_joins_lines_in_order() {
        let blocks = vec![
            TextBlock {
                block_type: BlockType::Page,
                text: None,
                confidence: Some(99.0),
            },
            TextBlock::line("first", 90.0),
            TextBlock {
                block_type: BlockType::Word,
                text: Some("first".to_string()),
                confidence: Some(10.0),
            },
            TextBlock::line("second", 80.0),
        ];

        let recognized = RecognizedText::from_blocks(&blocks);
        assert_eq!(recognized.text, "first\nsecond");
        assert_eq!(recognized.confidence, 85.0);
        assert_eq!(recognized.line_count, 2);
    }

    #[test]
    fn test_recognized_text_without_confidence_is_zero() {
        let blocks = vec![TextBlock {
            block_type: BlockType::Line,
            text: Some("x".to_string()),
            confidence: None,
        }];
        let recognized = RecognizedText::from_blocks(&blocks);
        assert_eq!(recognized.text, "x");
        assert_eq!(recognized.confidence, 0.0);

        let empty = RecognizedText::from_blocks(&[]);
        assert_eq!(empty.text, "");
        assert_eq!(empty.line_count, 0);
    }

    #[test]
    fn test_poll_response_wire_format() {
        let json = r#"{"status":"SUCCEEDED","blocks":[{"blockType":"LINE","text":"Hi","confidence":97.5}]}"#;
        let response: PollResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.status, RecognitionStatus::Succeeded);
        assert_eq!(response.blocks, vec![TextBlock::line("Hi", 97.5)]);

        let json = r#"{"status":"IN_PROGRESS"}"#;
        let response: PollResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response, PollResponse::in_progress());
    }
}
