//! Where batches come from, and how their outcome is acknowledged.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use thiserror::Error;

use super::consumer::BatchReport;
use super::message::RawMessage;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue unavailable: {0}")]
    Unavailable(String),
}

/// An at-least-once message queue.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Takes up to `max` waiting messages. Returns an empty batch when idle.
    async fn receive(&self, max: usize) -> Result<Vec<RawMessage>, QueueError>;

    /// Deletes the messages that succeeded, makes the ones listed in
    /// `report.redeliver` visible again and dead-letters the remaining failures.
    async fn settle(&self, report: &BatchReport) -> Result<(), QueueError>;
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<RawMessage>,
    in_flight: HashMap<String, RawMessage>,
    receives: HashMap<String, u32>,
    dead_letter: Vec<RawMessage>,
}

/// In-process queue. A message that fails `max_receives` times moves to the
/// dead-letter list instead of being redelivered again.
pub struct MemoryQueue {
    state: Mutex<QueueState>,
    max_receives: u32,
}

impl MemoryQueue {
    pub fn new(max_receives: u32) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            max_receives: max_receives.max(1),
        }
    }

    pub fn push(&self, message: RawMessage) {
        self.lock().ready.push_back(message);
    }

    pub fn extend(&self, messages: impl IntoIterator<Item = RawMessage>) {
        self.lock().ready.extend(messages);
    }

    /// Messages waiting for delivery.
    pub fn len(&self) -> usize {
        self.lock().ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }

    pub fn dead_letters(&self) -> Vec<RawMessage> {
        self.lock().dead_letter.clone()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Memory queue lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(5)
    }
}

#[async_trait]
impl MessageSource for MemoryQueue {
    async fn receive(&self, max: usize) -> Result<Vec<RawMessage>, QueueError> {
        let mut state = self.lock();
        let take = max.min(state.ready.len());
        let batch: Vec<RawMessage> = state.ready.drain(..take).collect();
        for message in &batch {
            *state.receives.entry(message.message_id.clone()).or_insert(0) += 1;
            state
                .in_flight
                .insert(message.message_id.clone(), message.clone());
        }
        Ok(batch)
    }

    async fn settle(&self, report: &BatchReport) -> Result<(), QueueError> {
        let mut state = self.lock();
        for result in &report.results {
            let Some(message) = state.in_flight.remove(&result.message_id) else {
                continue;
            };
            if result.success {
                state.receives.remove(&message.message_id);
                continue;
            }
            if !report.redeliver.contains(&message.message_id) {
                log::warn!(
                    "Message {} failed permanently, moving to dead letter",
                    message.message_id
                );
                state.receives.remove(&message.message_id);
                state.dead_letter.push(message);
                continue;
            }

            let receives = state.receives.get(&message.message_id).copied().unwrap_or(0);
            if receives >= self.max_receives {
                log::warn!(
                    "Message {} failed {} times, moving to dead letter",
                    message.message_id,
                    receives
                );
                state.receives.remove(&message.message_id);
                state.dead_letter.push(message);
            } else {
                state.ready.push_back(message);
            }
        }
        Ok(())
    }
}
