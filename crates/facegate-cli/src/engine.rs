use facegate_core::{CaptureError, CapturedFrame, FrameSource};
use facegate_hw::{Camera, CameraError, Frame, FrameError};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("capture thread exited")]
    ChannelClosed,
}

impl From<EngineError> for CaptureError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Camera(e) => e.into(),
            EngineError::Frame(e) => e.into(),
            EngineError::ChannelClosed => CaptureError::Failed("capture thread exited".into()),
        }
    }
}

/// Messages sent from async callers to the capture thread.
enum CaptureRequest {
    /// Raw grayscale frame, for diagnostics.
    Raw {
        reply: oneshot::Sender<Result<Frame, EngineError>>,
    },
    /// Frame encoded as PNG, ready for upload.
    Encoded {
        reply: oneshot::Sender<Result<CapturedFrame, EngineError>>,
    },
}

/// Clone-safe handle to the capture thread.
#[derive(Clone)]
pub struct CaptureHandle {
    tx: mpsc::Sender<CaptureRequest>,
}

impl CaptureHandle {
    pub async fn capture_raw(&self) -> Result<Frame, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(CaptureRequest::Raw { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn capture_encoded(&self) -> Result<CapturedFrame, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(CaptureRequest::Encoded { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

impl FrameSource for CaptureHandle {
    async fn capture(&self) -> Result<CapturedFrame, CaptureError> {
        Ok(self.capture_encoded().await?)
    }
}

/// Open the camera and move it onto a dedicated OS thread.
///
/// Fails fast if the device cannot be opened. Warmup frames are discarded
/// before the first request is served. The thread exits once every handle
/// is dropped, closing the device.
pub fn spawn_capture_engine(
    camera_device: &str,
    warmup_frames: usize,
) -> Result<CaptureHandle, EngineError> {
    let camera = Camera::open(camera_device)?;
    tracing::info!(
        device = camera_device,
        width = camera.width,
        height = camera.height,
        fourcc = ?camera.fourcc,
        "camera opened"
    );

    if warmup_frames > 0 {
        tracing::info!(count = warmup_frames, "discarding warmup frames");
        if let Err(err) = camera.discard_frames(warmup_frames) {
            tracing::warn!(error = %err, "warmup capture failed");
        }
    }

    let (tx, mut rx) = mpsc::channel::<CaptureRequest>(4);

    std::thread::Builder::new()
        .name("facegate-capture".into())
        .spawn(move || {
            tracing::debug!("capture thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    CaptureRequest::Raw { reply } => {
                        let _ = reply.send(camera.capture_frame().map_err(EngineError::from));
                    }
                    CaptureRequest::Encoded { reply } => {
                        let _ = reply.send(capture_encoded(&camera));
                    }
                }
            }
            tracing::debug!("capture thread exiting");
        })
        .map_err(|e| {
            EngineError::Camera(CameraError::CaptureFailed(format!(
                "failed to spawn capture thread: {e}"
            )))
        })?;

    Ok(CaptureHandle { tx })
}

fn capture_encoded(camera: &Camera) -> Result<CapturedFrame, EngineError> {
    let frame = camera.capture_frame()?;
    let captured = frame.to_captured()?;
    tracing::debug!(
        seq = frame.sequence,
        brightness = frame.avg_brightness(),
        bytes = captured.png.len(),
        "frame encoded"
    );
    Ok(captured)
}
