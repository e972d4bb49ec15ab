use crate::error::{BackendError, CaptureError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Opaque key for a previously enrolled face record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityRef(String);

impl IdentityRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdentityRef {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for IdentityRef {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A still frame encoded as PNG, ready for upload.
///
/// Produced fresh for every submission and dropped once submitted.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Backend verdict for a single verify-with-id submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Match,
    NoMatch,
}

/// Backend verdict for a pairwise image comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparison {
    Match,
    NoMatch,
    /// Any other `result` text the backend returned.
    Other(String),
}

impl Comparison {
    /// Interpret the backend's `result` string.
    pub fn from_result(text: &str) -> Self {
        match text {
            "Face match!" => Self::Match,
            "No match." => Self::NoMatch,
            other => Self::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Error,
    Info,
}

/// A transient operator-facing message. Never persisted.
#[derive(Debug, Clone)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            at: Utc::now(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, message)
    }
}

/// Surface for transient success/error/info messages.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Camera capability plus frame encoder: yields one encoded still per call.
pub trait FrameSource: Send + Sync {
    fn capture(&self) -> impl Future<Output = Result<CapturedFrame, CaptureError>> + Send;
}

/// Remote face-recognition backend.
///
/// Implementations perform exactly one request per call. Retry policy
/// belongs to the caller.
pub trait FaceBackend: Send + Sync {
    /// Submit a frame against an enrolled identity.
    fn verify_with_id(
        &self,
        frame: &CapturedFrame,
        identity: &IdentityRef,
    ) -> impl Future<Output = Result<Verdict, BackendError>> + Send;

    /// Enroll a new face; returns the identity the backend assigned.
    fn upload_image(
        &self,
        frame: &CapturedFrame,
    ) -> impl Future<Output = Result<IdentityRef, BackendError>> + Send;

    /// All enrolled identities, used to populate selection.
    fn list_identities(&self) -> impl Future<Output = Result<Vec<IdentityRef>, BackendError>> + Send;

    /// Compare two independently captured frames.
    fn compare_images(
        &self,
        first: &CapturedFrame,
        second: &CapturedFrame,
    ) -> impl Future<Output = Result<Comparison, BackendError>> + Send;
}

/// Timing and retry policy for a verification poll session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Interval between capture ticks.
    pub period: Duration,
    /// Number of no-match verdicts tolerated before giving up.
    pub attempt_ceiling: u32,
    /// How long the success message stays up before the session resets.
    pub success_reset_delay: Duration,
    /// How long the exhaustion message stays up before the session resets.
    pub failure_reset_delay: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(2000),
            attempt_ceiling: 4,
            success_reset_delay: Duration::from_millis(5000),
            failure_reset_delay: Duration::from_millis(2000),
        }
    }
}
