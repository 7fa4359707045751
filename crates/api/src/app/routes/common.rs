use athanor_core::{NewAudit, SYSTEM_ENTITY, actions};
use athanor_infra::QueueError;
use tracing::{error, warn};

use crate::app::AppState;

/// Record a background-dispatch failure without failing the request.
///
/// The failure is logged and, when the queue itself still accepts
/// work, written to the trail as an `async_error` audit. A failure to
/// record that audit only leaves the log line.
pub async fn report_async_error(state: &AppState, path: &str, err: QueueError) {
    error!(path, error = %err, "async dispatch failed");
    let audit = NewAudit::system(actions::ASYNC_ERROR, SYSTEM_ENTITY, format!("{path}: {err}"));
    if let Err(enqueue_err) = state.queue.enqueue_audit(audit).await {
        warn!(path, error = %enqueue_err, "could not record async error audit");
    }
}
