pub mod config;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod stage;
pub mod sweeper;

pub use config::PipelineConfig;
pub use context::{JobRequest, JobSettings, PipelineContext};
pub use error::{ErrorKind, PipelineError};
pub use orchestrator::{combined_confidence, JobOutcome, JobProcessor, JobSummary, Orchestrator};
pub use sweeper::{StaleJobSweeper, SweepReport};
