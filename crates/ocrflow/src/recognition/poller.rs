//! Adaptive polling of a recognition job.
//!
//! The loop is split in two: `PollMachine` is a pure transition function
//! from poll events to actions, and `Poller` feeds it real responses and
//! performs the sleeps it asks for on an injected `Clock`.

use std::time::Duration;

use thiserror::Error;

use super::{PollResponse, RecognitionError, RecognitionHandle, RecognitionStatus, TextBlock, TextRecognizer};
use crate::clock::Clock;

/// Sleep before the next poll after `attempt` in-progress responses.
pub fn backoff_delay(attempt: u32) -> Duration {
    match attempt {
        0..=3 => Duration::from_millis(500),
        4..=6 => Duration::from_secs(1),
        7..=9 => Duration::from_secs(2),
        _ => Duration::from_secs(5),
    }
}

#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Ceiling on wall-clock time since polling began.
    pub max_wait: Duration,
    /// Fixed sleep after a transient poll error.
    pub transient_retry_delay: Duration,
    /// Consecutive transient errors tolerated before giving up.
    pub max_transient_errors: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(180),
            transient_retry_delay: Duration::from_secs(1),
            max_transient_errors: 3,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PollError {
    #[error("Recognition service reported failure: {0}")]
    ServiceFailed(String),

    #[error("Recognition job handle is invalid: {0}")]
    InvalidHandle(String),

    #[error("Recognition did not finish within {max_wait:?} (waited {elapsed:?})")]
    TimedOut { elapsed: Duration, max_wait: Duration },

    #[error("Gave up after {errors} consecutive transient poll errors: {last}")]
    TransientExhausted { errors: u32, last: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Submitted,
    /// `attempt` counts in-progress responses seen so far.
    Polling { attempt: u32 },
    Succeeded,
    Failed,
    TimedOut,
}

impl PollState {
    pub fn is_final(&self) -> bool {
        matches!(self, PollState::Succeeded | PollState::Failed | PollState::TimedOut)
    }
}

/// Outcome of one poll call, as seen by the state machine.
#[derive(Debug, Clone)]
pub enum PollEvent {
    Response(PollResponse),
    TransientError(String),
    InvalidHandle(String),
}

impl From<Result<PollResponse, RecognitionError>> for PollEvent {
    fn from(result: Result<PollResponse, RecognitionError>) -> Self {
        match result {
            Ok(response) => PollEvent::Response(response),
            Err(RecognitionError::InvalidHandle(handle)) => PollEvent::InvalidHandle(handle),
            Err(RecognitionError::Rejected(message)) => PollEvent::Response(PollResponse::failed(&message)),
            Err(e) => PollEvent::TransientError(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollAction {
    Sleep(Duration),
    Complete(Vec<TextBlock>),
    Fail(PollError),
}

#[derive(Debug, Clone)]
pub struct PollMachine {
    policy: PollPolicy,
    state: PollState,
    consecutive_transient: u32,
}

impl PollMachine {
    pub fn new(policy: PollPolicy) -> Self {
        Self {
            policy,
            state: PollState::Submitted,
            consecutive_transient: 0,
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    fn attempt(&self) -> u32 {
        match self.state {
            PollState::Polling { attempt } => attempt,
            _ => 0,
        }
    }

    /// Advances on one event. `elapsed` is the time since polling began.
    pub fn on_event(&mut self, event: PollEvent, elapsed: Duration) -> PollAction {
        if self.state.is_final() {
            return PollAction::Fail(PollError::ServiceFailed(format!(
                "poll event after final state {:?}",
                self.state
            )));
        }

        match event {
            PollEvent::Response(response) => match response.status {
                RecognitionStatus::Succeeded => {
                    self.state = PollState::Succeeded;
                    PollAction::Complete(response.blocks)
                }
                RecognitionStatus::Failed => {
                    self.state = PollState::Failed;
                    let reason = response
                        .reason
                        .unwrap_or_else(|| "no reason given".to_string());
                    PollAction::Fail(PollError::ServiceFailed(reason))
                }
                RecognitionStatus::InProgress => {
                    self.consecutive_transient = 0;
                    let attempt = self.attempt() + 1;
                    self.wait_or_time_out(attempt, backoff_delay(attempt), elapsed)
                }
            },
            PollEvent::InvalidHandle(handle) => {
                self.state = PollState::Failed;
                PollAction::Fail(PollError::InvalidHandle(handle))
            }
            PollEvent::TransientError(message) => {
                self.consecutive_transient += 1;
                if self.consecutive_transient > self.policy.max_transient_errors {
                    self.state = PollState::Failed;
                    return PollAction::Fail(PollError::TransientExhausted {
                        errors: self.consecutive_transient,
                        last: message,
                    });
                }
                let attempt = self.attempt();
                self.wait_or_time_out(attempt, self.policy.transient_retry_delay, elapsed)
            }
        }
    }

    fn wait_or_time_out(&mut self, attempt: u32, delay: Duration, elapsed: Duration) -> PollAction {
        if elapsed >= self.policy.max_wait {
            self.state = PollState::TimedOut;
            return PollAction::Fail(PollError::TimedOut {
                elapsed,
                max_wait: self.policy.max_wait,
            });
        }
        self.state = PollState::Polling { attempt };
        PollAction::Sleep(delay)
    }
}

/// Drives a `PollMachine` against a live recognizer.
pub struct Poller<'a> {
    recognizer: &'a dyn TextRecognizer,
    clock: &'a dyn Clock,
    policy: PollPolicy,
}

impl<'a> Poller<'a> {
    pub fn new(recognizer: &'a dyn TextRecognizer, clock: &'a dyn Clock, policy: PollPolicy) -> Self {
        Self {
            recognizer,
            clock,
            policy,
        }
    }

    /// Polls until the job settles and returns its blocks.
    pub async fn wait_for(&self, handle: &RecognitionHandle) -> Result<Vec<TextBlock>, PollError> {
        let started = self.clock.now();
        let mut machine = PollMachine::new(self.policy.clone());

        loop {
            let event = PollEvent::from(self.recognizer.poll(handle).await);
            if let PollEvent::TransientError(message) = &event {
                log::warn!("Transient error polling {}: {}", handle, message);
            }

            let elapsed = self.clock.now().saturating_duration_since(started);
            match machine.on_event(event, elapsed) {
                PollAction::Sleep(delay) => {
                    log::debug!("{} still in progress ({:?}), next poll in {:?}", handle, machine.state(), delay);
                    self.clock.sleep(delay).await;
                }
                PollAction::Complete(blocks) => {
                    log::debug!("{} finished after {:?} with {} blocks", handle, elapsed, blocks.len());
                    return Ok(blocks);
                }
                PollAction::Fail(error) => return Err(error),
            }
        }
    }
}
