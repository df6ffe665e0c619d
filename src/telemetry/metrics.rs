//! Metric instrument factories for crawlq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without one registered, every instrument is a no-op.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("crawlq")
}

/// Counter: enqueue attempts.
/// Labels: `result` ("ok" | "full" | "error").
pub fn requests_enqueued() -> Counter<u64> {
    meter()
        .u64_counter("crawlq.queue.enqueued")
        .with_description("Number of requests offered to the queue")
        .build()
}

/// Counter: requests handed to a worker.
pub fn requests_dispatched() -> Counter<u64> {
    meter()
        .u64_counter("crawlq.queue.dispatched")
        .with_description("Number of requests handed to a worker")
        .build()
}

/// Counter: requests a worker reported finished.
pub fn requests_completed() -> Counter<u64> {
    meter()
        .u64_counter("crawlq.queue.completed")
        .with_description("Number of requests finished by a worker")
        .build()
}

/// Counter: requests dropped because they could not be loaded from storage.
pub fn load_skipped() -> Counter<u64> {
    meter()
        .u64_counter("crawlq.queue.load_skipped")
        .with_description("Requests skipped after a failed load")
        .build()
}

/// Counter: backend operations (create, send, pop, drop).
/// Labels: `queue`, `operation`.
pub fn storage_operations() -> Counter<u64> {
    meter()
        .u64_counter("crawlq.storage.operations")
        .with_description("Number of storage backend operations")
        .build()
}

/// Histogram: time a worker spent on one request.
pub fn request_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("crawlq.request.duration_ms")
        .with_description("Request execution time in milliseconds")
        .with_unit("ms")
        .build()
}
