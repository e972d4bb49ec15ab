//! Identity selection list, populated from the backend.

use crate::types::{FaceBackend, IdentityRef};

/// Fetch enrolled identities. A failed fetch yields an empty list, which
/// leaves nothing selectable and so prevents polling from starting.
pub async fn load_identities<B: FaceBackend>(backend: &B) -> Vec<IdentityRef> {
    match backend.list_identities().await {
        Ok(ids) => {
            tracing::debug!(count = ids.len(), "identity list loaded");
            ids
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to fetch identity list");
            Vec::new()
        }
    }
}

/// Resolve an operator choice against the list.
///
/// `choice` may be an id present in the list or a 1-based position.
pub fn select(ids: &[IdentityRef], choice: &str) -> Option<IdentityRef> {
    let choice = choice.trim();
    if choice.is_empty() {
        return None;
    }
    if let Some(id) = ids.iter().find(|id| id.as_str() == choice) {
        return Some(id.clone());
    }
    choice
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|idx| ids.get(idx))
        .cloned()
}
