// src/connection/session.rs

//! Defines the lifecycle state shared by a session's reader, writer and registry entry.

use std::sync::atomic::{AtomicU8, Ordering};

/// The lifecycle of a single session.
///
/// `Connecting -> Active -> Closing -> Closed`. A session may also go straight
/// from `Connecting` to `Closing` if it is torn down before activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionStatus {
    Connecting = 0,
    Active = 1,
    Closing = 2,
    Closed = 3,
}

impl From<u8> for SessionStatus {
    fn from(v: u8) -> Self {
        match v {
            0 => SessionStatus::Connecting,
            1 => SessionStatus::Active,
            2 => SessionStatus::Closing,
            _ => SessionStatus::Closed,
        }
    }
}

/// Atomic holder of a `SessionStatus`. Transitions only ever move forward.
#[derive(Debug)]
pub struct SessionLifecycle {
    status: AtomicU8,
}

impl Default for SessionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLifecycle {
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(SessionStatus::Connecting as u8),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status.load(Ordering::Acquire).into()
    }

    /// `Connecting -> Active`. Returns false if the session already moved on.
    pub fn activate(&self) -> bool {
        self.advance(SessionStatus::Active)
    }

    /// Moves the session to `Closing`. Returns true only for the caller that
    /// performed the transition.
    pub fn begin_closing(&self) -> bool {
        self.advance(SessionStatus::Closing)
    }

    /// Final transition once both loops have exited.
    pub fn mark_closed(&self) -> bool {
        self.advance(SessionStatus::Closed)
    }

    fn advance(&self, to: SessionStatus) -> bool {
        self.status
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < to as u8).then_some(to as u8)
            })
            .is_ok()
    }
}
