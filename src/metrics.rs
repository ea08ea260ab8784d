//! Metrics for feed throughput and session behavior.
//!
//! Names and helpers only; installing an exporter is left to the
//! embedding application.

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use tracing::debug;

// === Metric Name Constants ===

/// Batches applied counter metric name.
pub const METRIC_BATCHES_APPLIED: &str = "feed_batches_applied_total";
/// Skipped records counter metric name.
pub const METRIC_RECORDS_SKIPPED: &str = "feed_records_skipped_total";
/// Unknown record kinds counter metric name.
pub const METRIC_UNKNOWN_RECORDS: &str = "feed_unknown_records_total";
/// Emitted snapshots counter metric name.
pub const METRIC_SNAPSHOTS_EMITTED: &str = "feed_snapshots_emitted_total";
/// Suppressed rebuilds counter metric name.
pub const METRIC_REBUILDS_SUPPRESSED: &str = "feed_rebuilds_suppressed_total";
/// Pagination requests counter metric name.
pub const METRIC_PAGINATIONS: &str = "feed_paginations_total";
/// Received feed frames counter metric name.
pub const METRIC_FRAMES_RECEIVED: &str = "feed_frames_received_total";
/// Undecodable feed frames counter metric name.
pub const METRIC_FRAME_DECODE_FAILURES: &str = "feed_frame_decode_failures_total";
/// Socket reconnect attempts counter metric name.
pub const METRIC_SOCKET_RECONNECTS: &str = "feed_socket_reconnects_total";
/// Batch application latency metric name.
pub const METRIC_BATCH_APPLY_LATENCY: &str = "feed_batch_apply_latency_ms";

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    describe_histogram!(
        METRIC_BATCH_APPLY_LATENCY,
        "Batch application latency in milliseconds"
    );

    describe_counter!(METRIC_BATCHES_APPLIED, "Total number of batches applied");
    describe_counter!(
        METRIC_RECORDS_SKIPPED,
        "Total number of records skipped by policy or malformed deltas"
    );
    describe_counter!(
        METRIC_UNKNOWN_RECORDS,
        "Total number of records with unknown kinds"
    );
    describe_counter!(
        METRIC_SNAPSHOTS_EMITTED,
        "Total number of snapshots emitted on session channels"
    );
    describe_counter!(
        METRIC_REBUILDS_SUPPRESSED,
        "Total number of update batches that caused no structural change"
    );
    describe_counter!(
        METRIC_PAGINATIONS,
        "Total number of accepted pagination requests"
    );
    describe_counter!(METRIC_FRAMES_RECEIVED, "Total number of feed frames received");
    describe_counter!(
        METRIC_FRAME_DECODE_FAILURES,
        "Total number of feed frames that failed to decode"
    );
    describe_counter!(
        METRIC_SOCKET_RECONNECTS,
        "Total number of feed socket reconnect attempts"
    );

    debug!("Metrics initialized");
}

/// Record batch application latency.
pub fn record_batch_apply_latency(start: Instant) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_BATCH_APPLY_LATENCY).record(latency_ms);
}

/// Increment batches applied counter.
pub fn inc_batches_applied() {
    counter!(METRIC_BATCHES_APPLIED).increment(1);
}

/// Increment skipped records counter.
pub fn inc_records_skipped(n: u64) {
    counter!(METRIC_RECORDS_SKIPPED).increment(n);
}

/// Increment unknown record kinds counter.
pub fn inc_unknown_records() {
    counter!(METRIC_UNKNOWN_RECORDS).increment(1);
}

/// Increment emitted snapshots counter.
pub fn inc_snapshots_emitted() {
    counter!(METRIC_SNAPSHOTS_EMITTED).increment(1);
}

/// Increment suppressed rebuilds counter.
pub fn inc_rebuilds_suppressed() {
    counter!(METRIC_REBUILDS_SUPPRESSED).increment(1);
}

/// Increment pagination requests counter.
pub fn inc_paginations() {
    counter!(METRIC_PAGINATIONS).increment(1);
}

/// Increment received frames counter.
pub fn inc_frames_received() {
    counter!(METRIC_FRAMES_RECEIVED).increment(1);
}

/// Increment frame decode failures counter.
pub fn inc_frame_decode_failures() {
    counter!(METRIC_FRAME_DECODE_FAILURES).increment(1);
}

/// Increment socket reconnects counter.
pub fn inc_socket_reconnects() {
    counter!(METRIC_SOCKET_RECONNECTS).increment(1);
}
