// src/core/errors.rs

//! Defines the primary error type for the entire application.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the relay.
///
/// Variants fall into three families that the connection handler treats differently:
/// transport faults end the session, protocol faults are logged and the session
/// keeps running, and auth/capacity faults are rejected at the HTTP boundary.
#[derive(Error, Debug)]
pub enum RelayError {
    // --- Transport faults ---
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection closed by peer: {0}")]
    PeerClosed(String),

    #[error("Frame of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("Peer did not answer keepalive probes in time")]
    LivenessTimeout,

    // --- Protocol faults ---
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("bad payload in request: {0}")]
    BadPayload(String),

    #[error("Unsupported event type '{0}'")]
    UnsupportedEventType(String),

    #[error("Failed to encode event: {0}")]
    Encode(String),

    // --- Auth faults ---
    #[error("Invalid or expired one-time token")]
    InvalidToken,

    #[error("Invalid username or password")]
    InvalidCredentials,

    // --- Capacity ---
    #[error("Maximum number of sessions ({0}) reached")]
    SessionLimitReached(usize),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Returns true for faults that must tear the session down.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RelayError::Io(_)
                | RelayError::Transport(_)
                | RelayError::PeerClosed(_)
                | RelayError::MessageTooLarge { .. }
                | RelayError::LivenessTimeout
        )
    }

    /// Returns true for disconnections that are part of a normal session lifetime
    /// and do not deserve a warning in the logs.
    pub fn is_normal_disconnect(&self) -> bool {
        match self {
            RelayError::PeerClosed(_) => true,
            RelayError::Io(arc_err) => matches!(
                arc_err.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
// We wrap it in an Arc to allow for cheap, shared cloning.
impl Clone for RelayError {
    fn clone(&self) -> Self {
        match self {
            RelayError::Io(e) => RelayError::Io(Arc::clone(e)),
            RelayError::Transport(s) => RelayError::Transport(s.clone()),
            RelayError::PeerClosed(s) => RelayError::PeerClosed(s.clone()),
            RelayError::MessageTooLarge { size, limit } => RelayError::MessageTooLarge {
                size: *size,
                limit: *limit,
            },
            RelayError::LivenessTimeout => RelayError::LivenessTimeout,
            RelayError::MalformedEvent(s) => RelayError::MalformedEvent(s.clone()),
            RelayError::BadPayload(s) => RelayError::BadPayload(s.clone()),
            RelayError::UnsupportedEventType(s) => RelayError::UnsupportedEventType(s.clone()),
            RelayError::Encode(s) => RelayError::Encode(s.clone()),
            RelayError::InvalidToken => RelayError::InvalidToken,
            RelayError::InvalidCredentials => RelayError::InvalidCredentials,
            RelayError::SessionLimitReached(n) => RelayError::SessionLimitReached(*n),
            RelayError::Internal(s) => RelayError::Internal(s.clone()),
        }
    }
}

impl PartialEq for RelayError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RelayError::Io(e1), RelayError::Io(e2)) => e1.to_string() == e2.to_string(),
            (RelayError::Transport(s1), RelayError::Transport(s2)) => s1 == s2,
            (RelayError::PeerClosed(s1), RelayError::PeerClosed(s2)) => s1 == s2,
            (
                RelayError::MessageTooLarge { size: s1, limit: l1 },
                RelayError::MessageTooLarge { size: s2, limit: l2 },
            ) => s1 == s2 && l1 == l2,
            (RelayError::MalformedEvent(s1), RelayError::MalformedEvent(s2)) => s1 == s2,
            (RelayError::BadPayload(s1), RelayError::BadPayload(s2)) => s1 == s2,
            (RelayError::UnsupportedEventType(s1), RelayError::UnsupportedEventType(s2)) => {
                s1 == s2
            }
            (RelayError::Encode(s1), RelayError::Encode(s2)) => s1 == s2,
            (RelayError::SessionLimitReached(n1), RelayError::SessionLimitReached(n2)) => n1 == n2,
            (RelayError::Internal(s1), RelayError::Internal(s2)) => s1 == s2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for RelayError {
    fn from(e: std::io::Error) -> Self {
        RelayError::Io(Arc::new(e))
    }
}

/// Unwraps the WebSocket or IO error behind an `axum::Error` so that ordinary
/// disconnects can be told apart from real transport faults.
impl From<axum::Error> for RelayError {
    fn from(e: axum::Error) -> Self {
        let inner = match e.into_inner().downcast::<tungstenite::Error>() {
            Ok(ws_err) => return RelayError::from(*ws_err),
            Err(inner) => inner,
        };
        match inner.downcast::<std::io::Error>() {
            Ok(io_err) => RelayError::Io(Arc::new(*io_err)),
            Err(other) => RelayError::Transport(other.to_string()),
        }
    }
}

impl From<tungstenite::Error> for RelayError {
    fn from(e: tungstenite::Error) -> Self {
        use tungstenite::error::{CapacityError, ProtocolError};
        match e {
            tungstenite::Error::Io(io_err) => RelayError::Io(Arc::new(io_err)),
            tungstenite::Error::ConnectionClosed
            | tungstenite::Error::AlreadyClosed
            | tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
                RelayError::PeerClosed(e.to_string())
            }
            tungstenite::Error::Capacity(CapacityError::MessageTooLong { size, max_size }) => {
                RelayError::MessageTooLarge {
                    size,
                    limit: max_size,
                }
            }
            other => RelayError::Transport(other.to_string()),
        }
    }
}
