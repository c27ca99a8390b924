//! Metric instruments, created from the global `"workhorse"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("workhorse")
}

/// Counter: work handed to a router.
/// Labels: `kind` ("work" | "child" | "finalizer").
pub fn work_routed() -> Counter<u64> {
    meter()
        .u64_counter("workhorse.work.routed")
        .with_description("Number of routes issued")
        .build()
}

/// Counter: primary runs that ended.
/// Labels: `behavior`, `outcome` ("success" | "failure").
pub fn work_runs() -> Counter<u64> {
    meter()
        .u64_counter("workhorse.work.runs")
        .with_description("Number of primary runs that ended")
        .build()
}

/// Counter: parents whose children all finished.
/// Labels: `behavior`, `finalizer` ("routed" | "none").
pub fn fan_in_closed() -> Counter<u64> {
    meter()
        .u64_counter("workhorse.fan_in.closed")
        .with_description("Number of closed fan-ins")
        .build()
}

/// Counter: finalizer runs that ended.
/// Labels: `behavior`, `outcome`.
pub fn finalizer_runs() -> Counter<u64> {
    meter()
        .u64_counter("workhorse.finalizer.runs")
        .with_description("Number of finalizer runs that ended")
        .build()
}

/// Histogram: behavior duration in milliseconds.
/// Labels: `operation` ("run" | "finalize").
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("workhorse.operation.duration_ms")
        .with_description("Behavior duration in milliseconds")
        .with_unit("ms")
        .build()
}
