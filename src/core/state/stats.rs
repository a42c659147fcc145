// src/core/state/stats.rs

//! Contains state definitions and logic for relay statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Holds all state and logic related to relay-wide statistics and monitoring.
#[derive(Debug)]
pub struct StatsState {
    /// The total number of sessions accepted since startup.
    total_sessions: AtomicU64,
    /// The total number of inbound events processed since startup.
    total_events: AtomicU64,
    /// The total number of inbound events rejected as malformed or unsupported.
    rejected_events: AtomicU64,
}

impl Default for StatsState {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsState {
    /// Creates a new `StatsState` with initialized counters.
    pub fn new() -> Self {
        Self {
            total_sessions: AtomicU64::new(0),
            total_events: AtomicU64::new(0),
            rejected_events: AtomicU64::new(0),
        }
    }

    /// Atomically increments the total number of sessions accepted.
    pub fn increment_total_sessions(&self) {
        self.total_sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// Gets the total number of sessions accepted.
    pub fn get_total_sessions(&self) -> u64 {
        self.total_sessions.load(Ordering::Relaxed)
    }

    /// Atomically increments the total number of events processed.
    pub fn increment_total_events(&self) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Gets the total number of events processed.
    pub fn get_total_events(&self) -> u64 {
        self.total_events.load(Ordering::Relaxed)
    }

    pub fn increment_rejected_events(&self) {
        self.rejected_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_rejected_events(&self) -> u64 {
        self.rejected_events.load(Ordering::Relaxed)
    }
}
