//! Single-shot enrollment: capture one frame, upload it, report the new id.

use crate::error::PollError;
use crate::types::{CapturedFrame, FaceBackend, FrameSource, IdentityRef, Notification, Notifier};

#[derive(Debug)]
pub enum EnrollState {
    NotCaptured,
    Captured(CapturedFrame),
    Submitting,
}

impl EnrollState {
    fn as_str(&self) -> &'static str {
        match self {
            Self::NotCaptured => "not captured",
            Self::Captured(_) => "captured",
            Self::Submitting => "submitting",
        }
    }
}

/// Enrollment flow state. Holds at most one captured frame.
#[derive(Debug)]
pub struct Enrollment {
    state: EnrollState,
}

impl Default for Enrollment {
    fn default() -> Self {
        Self::new()
    }
}

impl Enrollment {
    pub fn new() -> Self {
        Self {
            state: EnrollState::NotCaptured,
        }
    }

    pub fn state(&self) -> &EnrollState {
        &self.state
    }

    /// The frame awaiting upload, if any.
    pub fn captured(&self) -> Option<&CapturedFrame> {
        match &self.state {
            EnrollState::Captured(frame) => Some(frame),
            _ => None,
        }
    }

    /// Take a still from `source`. Only valid before anything is captured.
    pub async fn capture<S: FrameSource>(&mut self, source: &S) -> Result<(), PollError> {
        self.accept(source.capture().await?)
    }

    /// Use an already encoded frame instead of capturing one.
    pub fn accept(&mut self, frame: CapturedFrame) -> Result<(), PollError> {
        if !matches!(self.state, EnrollState::NotCaptured) {
            return Err(PollError::InvalidTransition {
                state: self.state.as_str(),
                action: "capture",
            });
        }
        tracing::debug!(
            width = frame.width,
            height = frame.height,
            bytes = frame.png.len(),
            "enroll: frame captured"
        );
        self.state = EnrollState::Captured(frame);
        Ok(())
    }

    /// Discard the captured frame.
    pub fn retake(&mut self) {
        if matches!(self.state, EnrollState::Captured(_)) {
            self.state = EnrollState::NotCaptured;
        }
    }

    /// Upload the captured frame once. The flow returns to `NotCaptured`
    /// whatever the outcome.
    pub async fn submit<B, N>(&mut self, backend: &B, notifier: &N) -> Result<IdentityRef, PollError>
    where
        B: FaceBackend,
        N: Notifier,
    {
        let frame = match std::mem::replace(&mut self.state, EnrollState::Submitting) {
            EnrollState::Captured(frame) => frame,
            other => {
                self.state = other;
                return Err(PollError::NothingCaptured);
            }
        };

        let result = backend.upload_image(&frame).await;
        self.state = EnrollState::NotCaptured;

        match result {
            Ok(id) => {
                tracing::info!(identity = %id, "enroll: face added");
                notifier.notify(Notification::success("Face added successfully!"));
                notifier.notify(Notification::info(format!("Your id is {id}")));
                Ok(id)
            }
            Err(err) => {
                tracing::error!(error = %err, "enroll: upload failed");
                notifier.notify(Notification::error("Error adding face."));
                Err(err.into())
            }
        }
    }
}
