//! `processing_stage` markers written as a job advances.

pub const AI_ENHANCED_PROCESSING: &str = "ai_enhanced_processing";
pub const DOWNLOADING_IMAGE: &str = "downloading_image";
pub const TEXT_RECOGNITION: &str = "text_recognition";
pub const AI_CORRECTION: &str = "ai_correction";
pub const COMPLETED: &str = "completed";
pub const FAILED: &str = "failed";
