//! facegate-core — Face verification flows against a remote recognition backend.
//!
//! Owns the verification poller (capture, submit, evaluate on a fixed
//! period with a bounded number of misses), plus the single-shot enrollment
//! and pairwise comparison flows. Camera, encoding and HTTP are reached only
//! through the traits in [`types`].

pub mod compare;
pub mod enroll;
pub mod error;
pub mod poller;
pub mod selection;
pub mod session;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{BackendError, CaptureError, PollError};
pub use poller::{PollCanceller, PollHandle, PollOutcome, PollReport, Poller};
pub use session::{PollSession, PollState, Step, TickOutcome};
pub use types::{
    CapturedFrame, Comparison, FaceBackend, FrameSource, IdentityRef, Notification,
    NotificationLevel, Notifier, PollConfig, Verdict,
};
