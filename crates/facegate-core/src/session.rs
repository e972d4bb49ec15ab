//! Verification poll session: the explicit state machine behind the poller.
//!
//! `Idle → Polling → {Verified, Exhausted}`. The session owns its counters;
//! the async driver in [`crate::poller`] owns the timer and feeds tick
//! outcomes in here.

use crate::error::{BackendError, PollError};
use crate::types::{IdentityRef, Verdict};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling,
    Verified,
    Exhausted,
}

impl PollState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Polling => "polling",
            Self::Verified => "verified",
            Self::Exhausted => "exhausted",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Verified | Self::Exhausted)
    }
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one submitted frame, as seen by the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Match,
    NoMatch,
    TransportError,
}

impl From<&Result<Verdict, BackendError>> for TickOutcome {
    fn from(result: &Result<Verdict, BackendError>) -> Self {
        match result {
            Ok(Verdict::Match) => Self::Match,
            Ok(Verdict::NoMatch) => Self::NoMatch,
            Err(_) => Self::TransportError,
        }
    }
}

/// What the session did with a recorded tick outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Positive match; the session is now terminal.
    Verified { attempt: u32 },
    /// No match, attempt counter still under the ceiling.
    Missed { attempt: u32, remaining: u32 },
    /// No match with the attempt counter at or past the ceiling; the session
    /// is now terminal.
    Exhausted { attempt: u32 },
    /// The submission never produced a verdict. The attempt still counts, but
    /// a transport failure never ends the session by itself.
    TransportFailed { attempt: u32 },
}

impl Step {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Verified { .. } | Self::Exhausted { .. })
    }
}

/// One run of capture-submit-evaluate cycles for a single identity.
#[derive(Debug)]
pub struct PollSession {
    id: Uuid,
    identity: IdentityRef,
    state: PollState,
    attempt_ceiling: u32,
    /// Submitted frames, whatever their outcome. The ceiling applies to this
    /// counter. Never decremented.
    attempts: u32,
    /// No-match verdicts, reported for diagnostics.
    misses: u32,
}

impl PollSession {
    /// A ceiling of zero is treated as one: the first no-match ends the session.
    pub fn new(identity: IdentityRef, attempt_ceiling: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity,
            state: PollState::Idle,
            attempt_ceiling: attempt_ceiling.max(1),
            attempts: 0,
            misses: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn identity(&self) -> &IdentityRef {
        &self.identity
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn misses(&self) -> u32 {
        self.misses
    }

    pub fn attempt_ceiling(&self) -> u32 {
        self.attempt_ceiling
    }

    /// `Idle → Polling`.
    pub fn start(&mut self) -> Result<(), PollError> {
        if self.state != PollState::Idle {
            return Err(self.invalid("start"));
        }
        self.state = PollState::Polling;
        Ok(())
    }

    /// Count a frame about to be submitted. Returns its 1-based attempt number.
    pub fn begin_attempt(&mut self) -> Result<u32, PollError> {
        if self.state != PollState::Polling {
            return Err(self.invalid("submit a frame"));
        }
        self.attempts += 1;
        Ok(self.attempts)
    }

    /// Apply the outcome of the most recent submission.
    pub fn record(&mut self, outcome: TickOutcome) -> Result<Step, PollError> {
        if self.state != PollState::Polling {
            return Err(self.invalid("record an outcome"));
        }
        let attempt = self.attempts;

        let step = match outcome {
            TickOutcome::Match => {
                self.state = PollState::Verified;
                Step::Verified { attempt }
            }
            TickOutcome::NoMatch => {
                self.misses += 1;
                if attempt >= self.attempt_ceiling {
                    self.state = PollState::Exhausted;
                    Step::Exhausted { attempt }
                } else {
                    Step::Missed {
                        attempt,
                        remaining: self.attempt_ceiling - attempt,
                    }
                }
            }
            TickOutcome::TransportError => Step::TransportFailed { attempt },
        };
        Ok(step)
    }

    fn invalid(&self, action: &'static str) -> PollError {
        PollError::InvalidTransition {
            state: self.state.as_str(),
            action,
        }
    }
}
