//! Job records, their status lifecycle, and partial updates.

pub mod model;
pub mod patch;

pub use model::{JobKey, JobRecord, JobStatus};
pub use patch::{JobPatch, PatchOutcome};
