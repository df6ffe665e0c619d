//! Span helpers for the run loop and for individual requests.

use tracing::Span;

use crate::model::Request;

/// Span covering one `Queue::run`.
pub fn start_run_span(threads: usize) -> Span {
    tracing::info_span!("queue.run", "queue.threads" = threads)
}

/// Span for one request on a worker.
///
/// `http.status_code` starts empty and is filled via [`record_status`].
pub fn start_request_span(request: &Request, worker: usize) -> Span {
    tracing::info_span!(
        "request.execute",
        "request.id" = %request.id,
        "request.method" = %request.method,
        "request.url" = %request.url,
        "request.depth" = request.depth,
        "worker" = worker,
        "http.status_code" = tracing::field::Empty,
    )
}

/// Record the response status on a request span.
pub fn record_status(span: &Span, status: u16) {
    span.record("http.status_code", status);
}
