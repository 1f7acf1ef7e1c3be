//! Sync run span helpers.

use tracing::Span;
use uuid::Uuid;

/// Start a span covering one sync run.
///
/// Result fields are declared empty and filled in via
/// [`record_delivery_failure`] and [`record_run_result`].
pub fn start_sync_span(run_id: &Uuid, pending: usize) -> Span {
    tracing::info_span!(
        "sync.run",
        "sync.run_id" = %run_id,
        "sync.pending" = pending,
        "sync.delivered" = tracing::field::Empty,
        "sync.failed_at" = tracing::field::Empty,
        "sync.error" = tracing::field::Empty,
        "sync.result" = tracing::field::Empty,
    )
}

/// Record how a sync run ended.
pub fn record_run_result(span: &Span, result: &str, delivered: usize) {
    span.record("sync.result", result);
    span.record("sync.delivered", delivered);
}

/// Record the step a run halted on.
pub fn record_delivery_failure(span: &Span, position: usize, error: &str) {
    span.record("sync.failed_at", position);
    span.record("sync.error", error);
}
