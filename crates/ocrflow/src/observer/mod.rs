//! Client-side view of a user's jobs.
//!
//! The observer polls the job store at a cadence that follows the state of
//! the jobs it sees, applies a fetch only when it differs from what it
//! already holds, and publishes status transitions and the grouped
//! document list on a broadcast channel.

mod group;
#[allow(clippy::module_inception)]
mod observer;
mod snapshot;

pub use group::{
    aggregate_confidence, aggregate_error, aggregate_status, group_documents, DocumentGroup,
    ObservedDocument,
};
pub use observer::{JobObserver, ObserverCommand, ObserverEvent, ObserverHandle, RefreshTrigger};
pub use snapshot::{status_changes, ObserverSettings, Snapshot, StatusChange};
