//! Correction Engine: rule-based cleanup of recognized text, document type
//! detection and type-specific enhancement.

pub mod document_type;
pub mod engine;
pub mod enhancers;
pub mod rules;

pub use document_type::{detect_document_type, DocumentType};
pub use engine::{
    Aggressiveness, CorrectedDocument, CorrectionEngine, CorrectionOptions, CorrectionOutcome,
    MODEL_IDENTIFIER,
};
pub use enhancers::{BusinessCardEnhancer, DocumentEnhancer, Enhancement, IdCardEnhancer, InvoiceEnhancer};
