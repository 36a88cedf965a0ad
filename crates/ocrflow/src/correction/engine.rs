use serde::{Deserialize, Serialize};

use super::document_type::{detect_document_type, DocumentType};
use super::enhancers::{standard_enhancers, DocumentEnhancer};
use super::rules::RuleSet;

/// Identifier recorded with every corrected job.
pub const MODEL_IDENTIFIER: &str = "rules-v1";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggressiveness {
    Conservative,
    #[default]
    Balanced,
    Aggressive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CorrectionOptions {
    /// Never change letter case.
    pub preserve_case: bool,
    /// Never change whitespace layout or line breaks.
    pub preserve_format: bool,
    pub aggressiveness: Aggressiveness,
}

impl Default for CorrectionOptions {
    fn default() -> Self {
        Self {
            preserve_case: true,
            preserve_format: false,
            aggressiveness: Aggressiveness::Balanced,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionOutcome {
    pub corrected: String,
    /// 0 to 1.
    pub confidence: f64,
    pub corrections_applied: u32,
    pub model_identifier: String,
}

/// Correction plus the detected type and enhancement pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectedDocument {
    pub outcome: CorrectionOutcome,
    pub document_type: DocumentType,
    pub enhanced: bool,
}

/// Confidence falls with the share of words that needed a rewrite.
fn correction_confidence(text: &str, corrections: u32) -> f64 {
    let words = text.split_whitespace().count();
    if words == 0 {
        return 0.0;
    }
    let ratio = corrections as f64 / words as f64;
    (0.98 - ratio * 0.5).clamp(0.5, 0.98)
}

/// Deterministic post-processor for recognized text.
pub struct CorrectionEngine {
    rules: RuleSet,
    enhancers: Vec<Box<dyn DocumentEnhancer>>,
    enhance: bool,
}

impl CorrectionEngine {
    pub fn new(enhance: bool) -> Self {
        Self {
            rules: RuleSet::standard(),
            enhancers: standard_enhancers(),
            enhance,
        }
    }

    pub fn correct(&self, text: &str, options: &CorrectionOptions) -> CorrectionOutcome {
        let (corrected, corrections_applied) = self.rules.apply(text, options);
        CorrectionOutcome {
            confidence: correction_confidence(text, corrections_applied),
            corrected,
            corrections_applied,
            model_identifier: MODEL_IDENTIFIER.to_string(),
        }
    }

    /// Detects the document type, corrects, then runs the matching
    /// enhancer (if enabled and one exists) over the corrected text.
    pub fn correct_document(
        &self,
        text: &str,
        filename: Option<&str>,
        options: &CorrectionOptions,
    ) -> CorrectedDocument {
        let document_type = detect_document_type(filename, text);
        let mut outcome = self.correct(text, options);

        let enhancer = self
            .enhancers
            .iter()
            .find(|e| e.document_type() == document_type);

        let enhanced = match enhancer {
            Some(enhancer) if self.enhance => {
                let enhancement = enhancer.enhance(&outcome.corrected);
                outcome.corrected = enhancement.text;
                outcome.corrections_applied += enhancement.changes;
                true
            }
            _ => false,
        };

        CorrectedDocument {
            outcome,
            document_type,
            enhanced,
        }
    }
}

impl Default for CorrectionEngine {
    fn default() -> Self {
        Self::new(true)
    }
}
