//! In-memory collaborators for exercising the flows without a camera or network.

use crate::error::{BackendError, CaptureError};
use crate::types::{
    CapturedFrame, Comparison, FaceBackend, FrameSource, IdentityRef, Notification, Notifier,
    Verdict,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub(crate) fn frame() -> CapturedFrame {
    CapturedFrame {
        png: vec![0x89, b'P', b'N', b'G'],
        width: 1,
        height: 1,
    }
}

/// Returns the same tiny frame on every call, optionally failing the first few.
pub(crate) struct FixedSource {
    captures: AtomicU32,
    fail_first: u32,
}

impl FixedSource {
    pub(crate) fn new() -> Self {
        Self::failing_first(0)
    }

    pub(crate) fn failing_first(count: u32) -> Self {
        Self {
            captures: AtomicU32::new(0),
            fail_first: count,
        }
    }

    pub(crate) fn captures(&self) -> u32 {
        self.captures.load(Ordering::SeqCst)
    }
}

impl FrameSource for FixedSource {
    async fn capture(&self) -> Result<CapturedFrame, CaptureError> {
        let n = self.captures.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_first {
            return Err(CaptureError::Failed("sensor timeout".into()));
        }
        Ok(frame())
    }
}

/// Backend that replays queued verify results, then falls back to a fixed verdict.
pub(crate) struct ScriptedBackend {
    script: Mutex<VecDeque<Result<Verdict, BackendError>>>,
    fallback: Verdict,
    latency: Duration,
    submissions: AtomicU32,
    in_flight: AtomicU32,
    pub(crate) max_in_flight: AtomicU32,
    identities: Option<Vec<IdentityRef>>,
    upload_id: Option<&'static str>,
    pub(crate) uploads: AtomicU32,
    comparison: Option<&'static str>,
    pub(crate) comparisons: AtomicU32,
}

impl ScriptedBackend {
    pub(crate) fn always(fallback: Verdict) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            latency: Duration::ZERO,
            submissions: AtomicU32::new(0),
            in_flight: AtomicU32::new(0),
            max_in_flight: AtomicU32::new(0),
            identities: None,
            upload_id: None,
            uploads: AtomicU32::new(0),
            comparison: None,
            comparisons: AtomicU32::new(0),
        }
    }

    pub(crate) fn then(self, result: Result<Verdict, BackendError>) -> Self {
        self.script.lock().unwrap().push_back(result);
        self
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub(crate) fn with_identities(mut self, ids: &[&str]) -> Self {
        self.identities = Some(ids.iter().map(|id| IdentityRef::new(*id)).collect());
        self
    }

    pub(crate) fn with_upload_id(mut self, id: &'static str) -> Self {
        self.upload_id = Some(id);
        self
    }

    pub(crate) fn with_comparison(mut self, result: &'static str) -> Self {
        self.comparison = Some(result);
        self
    }

    pub(crate) fn submissions(&self) -> u32 {
        self.submissions.load(Ordering::SeqCst)
    }
}

impl FaceBackend for ScriptedBackend {
    async fn verify_with_id(
        &self,
        _frame: &CapturedFrame,
        _identity: &IdentityRef,
    ) -> Result<Verdict, BackendError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or(Ok(self.fallback))
    }

    async fn upload_image(&self, _frame: &CapturedFrame) -> Result<IdentityRef, BackendError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.upload_id
            .map(IdentityRef::new)
            .ok_or(BackendError::Rejected { status: 500 })
    }

    async fn list_identities(&self) -> Result<Vec<IdentityRef>, BackendError> {
        self.identities
            .clone()
            .ok_or_else(|| BackendError::Transport("connection refused".into()))
    }

    async fn compare_images(
        &self,
        _first: &CapturedFrame,
        _second: &CapturedFrame,
    ) -> Result<Comparison, BackendError> {
        self.comparisons.fetch_add(1, Ordering::SeqCst);
        self.comparison
            .map(Comparison::from_result)
            .ok_or_else(|| BackendError::Transport("connection reset".into()))
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    notes: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub(crate) fn notifications(&self) -> Vec<Notification> {
        self.notes.lock().unwrap().clone()
    }

    pub(crate) fn messages(&self) -> Vec<String> {
        self.notifications()
            .into_iter()
            .map(|n| n.message)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.notes.lock().unwrap().push(notification);
    }
}
