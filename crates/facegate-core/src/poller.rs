//! Async driver for verification poll sessions.
//!
//! Each session runs on its own tokio task with one periodic timer. A tick
//! captures a frame, submits it, and feeds the verdict into the
//! [`PollSession`] state machine. The tick's capture and submission are
//! awaited before the timer is polled again, so at most one submission is
//! in flight per session.

use crate::error::PollError;
use crate::session::{PollSession, Step, TickOutcome};
use crate::types::{FaceBackend, FrameSource, IdentityRef, Notification, Notifier, PollConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::Instrument;
use uuid::Uuid;

/// `tokio::time::interval` panics on a zero period.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// How a poll session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Verified,
    Exhausted,
    /// Cancelled or torn down before reaching a terminal state.
    Cancelled,
}

/// Summary returned when a poll session ends.
#[derive(Debug, Clone)]
pub struct PollReport {
    pub session_id: Uuid,
    pub identity: IdentityRef,
    pub outcome: PollOutcome,
    /// Frames submitted.
    pub attempts: u32,
    /// No-match verdicts received.
    pub misses: u32,
}

/// Starts poll sessions against a frame source and a backend.
pub struct Poller<S, B, N> {
    source: Arc<S>,
    backend: Arc<B>,
    notifier: Arc<N>,
    config: PollConfig,
}

impl<S, B, N> Poller<S, B, N>
where
    S: FrameSource + 'static,
    B: FaceBackend + 'static,
    N: Notifier + 'static,
{
    pub fn new(source: Arc<S>, backend: Arc<B>, notifier: Arc<N>, config: PollConfig) -> Self {
        Self {
            source,
            backend,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Start polling for the selected identity.
    ///
    /// Fails without touching the camera or backend when nothing is selected.
    /// The first tick fires one period after this call.
    pub fn start(&self, selection: Option<IdentityRef>) -> Result<PollHandle, PollError> {
        let identity = selection.ok_or(PollError::NoIdentitySelected)?;
        let mut session = PollSession::new(identity, self.config.attempt_ceiling);
        session.start()?;

        let session_id = session.id();
        let span = tracing::info_span!(
            "poll",
            session_id = %session_id,
            identity = %session.identity(),
        );
        span.in_scope(|| {
            tracing::info!(
                period_ms = self.config.period.as_millis() as u64,
                ceiling = session.attempt_ceiling(),
                "poll session started"
            );
        });

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(
            drive(
                session,
                Arc::clone(&self.source),
                Arc::clone(&self.backend),
                Arc::clone(&self.notifier),
                self.config,
                cancel_rx,
            )
            .instrument(span),
        );

        Ok(PollHandle {
            session_id,
            cancel: Arc::new(cancel_tx),
            task,
        })
    }
}

/// Owner of a running poll session.
///
/// Dropping the handle tears the session down: its timer is cancelled and
/// no further tick fires.
pub struct PollHandle {
    session_id: Uuid,
    cancel: Arc<watch::Sender<bool>>,
    task: JoinHandle<PollReport>,
}

/// Detached cancel trigger for a running session, e.g. for a signal handler.
#[derive(Clone)]
pub struct PollCanceller {
    cancel: Arc<watch::Sender<bool>>,
}

impl PollCanceller {
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }
}

impl PollHandle {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Stop the session. Safe to call any number of times, including after
    /// the session already ended.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn canceller(&self) -> PollCanceller {
        PollCanceller {
            cancel: Arc::clone(&self.cancel),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session to end, including its reset delay.
    pub async fn wait(mut self) -> Result<PollReport, JoinError> {
        (&mut self.task).await
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel.send_replace(true);
        self.task.abort();
    }
}

/// Resolves once cancellation is requested or every sender is gone.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|cancelled| *cancelled).await;
}

async fn drive<S, B, N>(
    mut session: PollSession,
    source: Arc<S>,
    backend: Arc<B>,
    notifier: Arc<N>,
    config: PollConfig,
    mut cancel: watch::Receiver<bool>,
) -> PollReport
where
    S: FrameSource,
    B: FaceBackend,
    N: Notifier,
{
    let period = config.period.max(MIN_PERIOD);
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let outcome = loop {
        tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => break PollOutcome::Cancelled,
            _ = ticker.tick() => {}
        }

        let step = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => break PollOutcome::Cancelled,
            step = run_tick(&mut session, source.as_ref(), backend.as_ref(), notifier.as_ref()) => step,
        };

        match step {
            Ok(Some(step)) => {
                announce(notifier.as_ref(), step);
                match step {
                    Step::Verified { .. } => break PollOutcome::Verified,
                    Step::Exhausted { .. } => break PollOutcome::Exhausted,
                    Step::Missed { .. } | Step::TransportFailed { .. } => {}
                }
            }
            Ok(None) => {}
            Err(err) => {
                tracing::error!(error = %err, "poll session left polling state unexpectedly");
                break PollOutcome::Cancelled;
            }
        }
    };

    drop(ticker);
    tracing::info!(
        outcome = ?outcome,
        attempts = session.attempts(),
        misses = session.misses(),
        "poll timer cancelled"
    );

    let reset_delay = match outcome {
        PollOutcome::Verified => Some(config.success_reset_delay),
        PollOutcome::Exhausted => Some(config.failure_reset_delay),
        PollOutcome::Cancelled => None,
    };
    if let Some(delay) = reset_delay {
        tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => {
                tracing::debug!("reset delay interrupted");
            }
            _ = time::sleep(delay) => {
                if outcome == PollOutcome::Verified {
                    notifier.notify(Notification::success("Face verification completed"));
                }
                tracing::info!("poll session reset");
            }
        }
    }

    PollReport {
        session_id: session.id(),
        identity: session.identity().clone(),
        outcome,
        attempts: session.attempts(),
        misses: session.misses(),
    }
}

/// One capture-submit-evaluate cycle. `Ok(None)` means no frame was
/// available and nothing was submitted.
async fn run_tick<S, B, N>(
    session: &mut PollSession,
    source: &S,
    backend: &B,
    notifier: &N,
) -> Result<Option<Step>, PollError>
where
    S: FrameSource,
    B: FaceBackend,
    N: Notifier,
{
    let frame = match source.capture().await {
        Ok(frame) => frame,
        Err(err) => {
            tracing::warn!(error = %err, "frame capture failed; skipping tick");
            notifier.notify(Notification::error("Unable to capture frame"));
            return Ok(None);
        }
    };

    let attempt = session.begin_attempt()?;
    tracing::debug!(attempt, bytes = frame.png.len(), "submitting frame");

    let result = backend.verify_with_id(&frame, session.identity()).await;
    drop(frame);

    if let Err(err) = &result {
        tracing::warn!(attempt, error = %err, "verification request failed");
    }
    let step = session.record(TickOutcome::from(&result))?;
    tracing::debug!(step = ?step, "tick recorded");
    Ok(Some(step))
}

fn announce<N: Notifier>(notifier: &N, step: Step) {
    let notification = match step {
        Step::Verified { .. } => Notification::success("Face verified"),
        Step::Missed { attempt, .. } => {
            Notification::error(format!("Face not matched! Attempt #{attempt}"))
        }
        Step::Exhausted { .. } => {
            Notification::error("Exceeded maximum attempts. The session will reset.")
        }
        Step::TransportFailed { .. } => Notification::error("Verification request failed"),
    };
    notifier.notify(notification);
}
