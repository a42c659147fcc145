// src/core/metrics.rs

//! Defines and registers Prometheus metrics for relay monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, TextEncoder, register_counter, register_counter_vec,
    register_gauge, register_histogram,
};

lazy_static! {
    // --- Session Gauges ---
    /// The number of sessions currently held by the registry.
    pub static ref ACTIVE_SESSIONS: Gauge =
        register_gauge!("roomcast_active_sessions", "Number of currently registered sessions.").unwrap();

    // --- Session Counters ---
    /// The total number of sessions opened since startup.
    pub static ref SESSIONS_OPENED_TOTAL: Counter =
        register_counter!("roomcast_sessions_opened_total", "Total number of sessions opened.").unwrap();
    /// Sessions torn down because the peer stopped answering keepalive probes.
    pub static ref LIVENESS_TIMEOUTS_TOTAL: Counter =
        register_counter!("roomcast_liveness_timeouts_total", "Total number of sessions closed by the liveness deadline.").unwrap();
    /// Upgrade attempts rejected at the HTTP boundary, labeled by reason.
    pub static ref UPGRADES_REJECTED_TOTAL: CounterVec =
        register_counter_vec!("roomcast_upgrades_rejected_total", "Total number of rejected upgrade requests, labeled by reason.", &["reason"]).unwrap();

    // --- Event Counters ---
    /// Events successfully dispatched, labeled by event type.
    pub static ref EVENTS_DISPATCHED_TOTAL: CounterVec =
        register_counter_vec!("roomcast_events_dispatched_total", "Total number of dispatched events, labeled by type.", &["type"]).unwrap();
    /// Inbound frames that failed decoding or dispatch.
    pub static ref EVENTS_REJECTED_TOTAL: Counter =
        register_counter!("roomcast_events_rejected_total", "Total number of inbound events rejected as malformed or unsupported.").unwrap();
    /// Outbound events dropped because a session's queue was full.
    pub static ref OUTBOUND_DROPPED_TOTAL: Counter =
        register_counter!("roomcast_outbound_dropped_total", "Total number of outbound events dropped by queue backpressure.").unwrap();

    // --- Token Counters ---
    pub static ref TOKENS_ISSUED_TOTAL: Counter =
        register_counter!("roomcast_tokens_issued_total", "Total number of one-time tokens issued.").unwrap();
    pub static ref TOKENS_CONSUMED_TOTAL: Counter =
        register_counter!("roomcast_tokens_consumed_total", "Total number of one-time tokens consumed by a connection.").unwrap();
    pub static ref TOKENS_EXPIRED_TOTAL: Counter =
        register_counter!("roomcast_tokens_expired_total", "Total number of one-time tokens that expired unused.").unwrap();

    // --- Histograms ---
    /// A histogram of event dispatch latencies.
    pub static ref DISPATCH_LATENCY_SECONDS: Histogram =
        register_histogram!("roomcast_dispatch_latency_seconds", "Latency of event dispatch in seconds.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap_or_default()
}
