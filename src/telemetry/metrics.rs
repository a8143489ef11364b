//! Metric instruments for workpull.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`
//! (a no-op until [`super::init_telemetry`] installs an exporter).

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("workpull")
}

/// Counter: fetch attempts.
/// Labels: `driver`, `result` ("item" | "empty" | "error").
pub fn fetches() -> Counter<u64> {
    meter()
        .u64_counter("workpull.fetches")
        .with_description("Number of fetch attempts")
        .build()
}

/// Counter: external program runs.
/// Labels: `driver`, `result` ("success" | "failure").
pub fn executions() -> Counter<u64> {
    meter()
        .u64_counter("workpull.executions")
        .with_description("Number of external program executions")
        .build()
}

/// Counter: acknowledge calls.
/// Labels: `driver`, `result` ("ok" | "error").
pub fn acknowledgements() -> Counter<u64> {
    meter()
        .u64_counter("workpull.acknowledgements")
        .with_description("Number of acknowledge calls")
        .build()
}

/// Counter: report-failure calls.
/// Labels: `driver`, `result` ("ok" | "error").
pub fn failure_reports() -> Counter<u64> {
    meter()
        .u64_counter("workpull.failure_reports")
        .with_description("Number of report-failure calls")
        .build()
}

/// Counter: queue-level operations (create, send, read, archive, delete).
/// Labels: `queue`, `operation`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("workpull.queue.operations")
        .with_description("Number of queue operations")
        .build()
}

/// Histogram: iteration duration in milliseconds, fetch through ack/fail.
/// Labels: `driver`, `outcome`.
pub fn iteration_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("workpull.iteration.duration_ms")
        .with_description("Duration of one fetch-execute-acknowledge iteration")
        .with_unit("ms")
        .build()
}
