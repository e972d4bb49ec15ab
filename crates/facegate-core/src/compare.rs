//! Single-shot pairwise comparison of two independently captured frames.

use crate::error::BackendError;
use crate::types::{CapturedFrame, Comparison, FaceBackend, Notification, Notifier};

/// Submit both frames once and surface the verdict. No retry.
pub async fn compare<B, N>(
    backend: &B,
    first: &CapturedFrame,
    second: &CapturedFrame,
    notifier: &N,
) -> Result<Comparison, BackendError>
where
    B: FaceBackend,
    N: Notifier,
{
    let result = backend.compare_images(first, second).await;

    let notification = match &result {
        Ok(Comparison::Match) => Notification::success("Face matched."),
        Ok(Comparison::NoMatch) => Notification::error("Face not matched."),
        Ok(Comparison::Other(text)) => Notification::info(format!("Comparison result: {text}")),
        Err(err) => {
            tracing::error!(error = %err, "compare: request failed");
            Notification::error("Comparison failed.")
        }
    };
    if let Ok(verdict) = &result {
        tracing::info!(verdict = ?verdict, "compare: verdict received");
    }
    notifier.notify(notification);

    result
}
