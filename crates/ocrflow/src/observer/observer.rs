//! Per-user observer loop: fetch, diff, notify, reschedule.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::job::{JobKey, JobRecord};
use crate::store::{JobQuery, StoreError};

use super::group::ObservedDocument;
use super::snapshot::{ObserverSettings, Snapshot, StatusChange};

const EVENT_CAPACITY: usize = 256;
const COMMAND_CAPACITY: usize = 32;

/// Notifications emitted after each applied change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ObserverEvent {
    /// One job moved to a new status.
    StatusChanged(StatusChange),
    /// The presented document list changed.
    DocumentsUpdated { documents: Vec<ObservedDocument> },
    /// A fetch failed; the previous view stays in place.
    FetchFailed { message: String },
}

/// Why an out-of-band refresh was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    Foreground,
    Reconnected,
    Manual,
}

#[derive(Debug, Clone)]
pub enum ObserverCommand {
    Refresh(RefreshTrigger),
    AddProvisional(JobRecord),
    FailProvisional(JobKey),
}

/// Cloneable handle for talking to a running observer.
#[derive(Debug, Clone)]
pub struct ObserverHandle {
    commands: mpsc::Sender<ObserverCommand>,
}

impl ObserverHandle {
    /// Returns false once the observer has stopped.
    pub async fn refresh(&self, trigger: RefreshTrigger) -> bool {
        self.send(ObserverCommand::Refresh(trigger)).await
    }

    pub async fn add_provisional(&self, record: JobRecord) -> bool {
        self.send(ObserverCommand::AddProvisional(record)).await
    }

    pub async fn fail_provisional(&self, key: JobKey) -> bool {
        self.send(ObserverCommand::FailProvisional(key)).await
    }

    async fn send(&self, command: ObserverCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }
}

/// Keeps a cached, grouped view of one user's jobs.
pub struct JobObserver {
    query: Arc<dyn JobQuery>,
    user_id: String,
    settings: ObserverSettings,
    clock: Arc<dyn Clock>,
    snapshot: Snapshot,
    idle_streak: u32,
    events: broadcast::Sender<ObserverEvent>,
    commands: mpsc::Receiver<ObserverCommand>,
}

impl JobObserver {
    pub fn new(
        query: Arc<dyn JobQuery>,
        user_id: impl Into<String>,
        settings: ObserverSettings,
        clock: Arc<dyn Clock>,
    ) -> (Self, ObserverHandle) {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (command_tx, commands) = mpsc::channel(COMMAND_CAPACITY);
        let observer = Self {
            query,
            user_id: user_id.into(),
            settings,
            clock,
            snapshot: Snapshot::default(),
            idle_streak: 0,
            events,
            commands,
        };
        (observer, ObserverHandle { commands: command_tx })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ObserverEvent> {
        self.events.subscribe()
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn documents(&self) -> Vec<ObservedDocument> {
        self.snapshot.documents()
    }

    pub fn jobs(&self) -> Vec<JobRecord> {
        self.snapshot.view()
    }

    pub fn add_provisional(&mut self, record: JobRecord) {
        debug!(job_id = %record.job_id, "Adding provisional job");
        self.snapshot.add_provisional(record);
        self.publish_documents();
    }

    pub fn fail_provisional(&mut self, key: &JobKey) {
        if self.snapshot.remove_provisional(key) {
            debug!(job = %key, "Dropped provisional job after failed submission");
            self.publish_documents();
        }
    }

    /// Fetches the user's jobs once and applies them if anything changed.
    /// Returns whether the view changed.
    pub async fn fetch(&mut self) -> Result<bool, StoreError> {
        let jobs = self
            .query
            .list_for_user(&self.user_id, self.settings.page_size)
            .await?;

        let Some(changes) = self.snapshot.apply(jobs) else {
            return Ok(false);
        };

        for change in changes {
            debug!(
                job_id = %change.job_id,
                from = %change.from,
                to = %change.to,
                "Job status changed"
            );
            let _ = self.events.send(ObserverEvent::StatusChanged(change));
        }
        self.publish_documents();
        Ok(true)
    }

    /// Delay before the next scheduled fetch given the current view.
    pub fn next_interval(&self) -> std::time::Duration {
        self.settings.interval_for(&self.snapshot, self.idle_streak)
    }

    /// A timer-driven fetch. Unlike out-of-band refreshes this one feeds the
    /// idle backoff.
    async fn scheduled_fetch(&mut self) {
        let changed = self.fetch_reporting().await;
        if changed || self.snapshot.any_active() || self.snapshot.any_waiting() {
            self.idle_streak = 0;
        } else {
            self.idle_streak = self.idle_streak.saturating_add(1);
        }
    }

    async fn fetch_reporting(&mut self) -> bool {
        match self.fetch().await {
            Ok(changed) => changed,
            Err(e) => {
                warn!(user_id = %self.user_id, "Job fetch failed: {}", e);
                let _ = self.events.send(ObserverEvent::FetchFailed {
                    message: e.to_string(),
                });
                false
            }
        }
    }

    async fn handle_command(&mut self, command: ObserverCommand) {
        match command {
            ObserverCommand::Refresh(trigger) => {
                debug!(?trigger, "Out-of-band refresh");
                self.fetch_reporting().await;
            }
            ObserverCommand::AddProvisional(record) => self.add_provisional(record),
            ObserverCommand::FailProvisional(key) => self.fail_provisional(&key),
        }
    }

    fn publish_documents(&self) {
        let _ = self.events.send(ObserverEvent::DocumentsUpdated {
            documents: self.snapshot.documents(),
        });
    }

    /// After a command revealed unfinished work, drops any idle backoff so
    /// the active cadence applies from now on.
    fn leave_idle(&mut self) -> bool {
        if self.snapshot.any_active() || self.snapshot.any_waiting() {
            self.idle_streak = 0;
            true
        } else {
            false
        }
    }

    /// Runs until `shutdown` turns true or its sender is dropped.
    ///
    /// Only one fetch is ever in flight. The next scheduled fetch is timed
    /// from the completion of the previous scheduled one; out-of-band
    /// refreshes run in between and can only bring it forward, when they
    /// reveal work that calls for a faster cadence.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Self {
        info!(user_id = %self.user_id, "Observer started");
        let mut last_scheduled = self.clock.now();
        let mut next_at = last_scheduled;
        let mut commands_open = true;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let wait = next_at.saturating_duration_since(self.clock.now());
            let clock = Arc::clone(&self.clock);

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                command = self.commands.recv(), if commands_open => match command {
                    Some(command) => {
                        self.handle_command(command).await;
                        if self.leave_idle() {
                            next_at = next_at.min(last_scheduled + self.next_interval());
                        }
                    }
                    None => commands_open = false,
                },
                _ = clock.sleep(wait) => {
                    self.scheduled_fetch().await;
                    last_scheduled = self.clock.now();
                    next_at = last_scheduled + self.next_interval();
                }
            }
        }

        info!(user_id = %self.user_id, "Observer stopped");
        self
    }
}
