use thiserror::Error;

/// Failure to obtain a still frame from the camera capability.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("camera not found: {0}")]
    DeviceNotFound(String),
    #[error("camera busy")]
    Busy,
    #[error("capture failed: {0}")]
    Failed(String),
    #[error("frame encoding failed: {0}")]
    Encode(String),
}

/// Failure talking to the recognition backend.
///
/// A negative verdict is not an error: it is reported as
/// [`Verdict::NoMatch`](crate::Verdict::NoMatch).
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("backend rejected request with HTTP status {status}")]
    Rejected { status: u16 },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Error, Debug)]
pub enum PollError {
    #[error("no identity selected")]
    NoIdentitySelected,
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        state: &'static str,
        action: &'static str,
    },
    #[error("no frame has been captured")]
    NothingCaptured,
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}
