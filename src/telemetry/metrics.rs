//! Metric instrument factories for stepsync.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"stepsync"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for stepsync instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("stepsync")
}

/// Counter: steps appended to the offline queue.
pub fn steps_appended() -> Counter<u64> {
    meter()
        .u64_counter("stepsync.steps.appended")
        .with_description("Number of workflow steps queued offline")
        .build()
}

/// Counter: queue-level operations.
/// Labels: `operation` ("append" | "list" | "clear" | "remove_delivered").
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("stepsync.queue.operations")
        .with_description("Number of durable queue operations")
        .build()
}

/// Counter: raw persistence operations.
/// Labels: `backend`, `operation` ("get" | "set" | "del").
pub fn store_operations() -> Counter<u64> {
    meter()
        .u64_counter("stepsync.store.operations")
        .with_description("Number of key-value store operations")
        .build()
}

/// Counter: sync runs.
/// Labels: `result` ("empty" | "delivered" | "halted").
pub fn sync_runs() -> Counter<u64> {
    meter()
        .u64_counter("stepsync.sync.runs")
        .with_description("Number of sync runs by result")
        .build()
}

/// Counter: steps handed to the delivery function.
/// Labels: `result` ("ok" | "failed" | "timeout").
pub fn steps_delivered() -> Counter<u64> {
    meter()
        .u64_counter("stepsync.steps.delivered")
        .with_description("Number of delivery attempts by result")
        .build()
}

/// Histogram: operation duration in milliseconds.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("stepsync.operation.duration_ms")
        .with_description("Operation duration in milliseconds")
        .with_unit("ms")
        .build()
}
