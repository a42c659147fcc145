// src/connection/guard.rs

//! Defines `ConnectionGuard`, an RAII guard for session resource management.

use super::session::SessionLifecycle;
use crate::core::registry::{Registry, SessionId};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// An RAII guard to ensure a session is always removed from the registry and
/// marked `Closed` when its connection handler's scope is exited, including by
/// a panic in one of its loops.
pub struct ConnectionGuard {
    /// The shared registry the session was added to.
    pub(crate) registry: Arc<Registry>,
    /// The unique identifier for the session.
    pub(crate) session_id: SessionId,
    /// The network address of the client, when known.
    pub(crate) addr: Option<SocketAddr>,
    pub(crate) lifecycle: Arc<SessionLifecycle>,
}

impl ConnectionGuard {
    /// Creates a new `ConnectionGuard`.
    pub(crate) fn new(
        registry: Arc<Registry>,
        session_id: SessionId,
        addr: Option<SocketAddr>,
        lifecycle: Arc<SessionLifecycle>,
    ) -> Self {
        Self {
            registry,
            session_id,
            addr,
            lifecycle,
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        // Normally one of the loops has already removed the session.
        if self.registry.remove(self.session_id) {
            debug!(
                "ConnectionGuard removed session {} ({:?}) from the registry.",
                self.session_id, self.addr
            );
        }
        self.lifecycle.mark_closed();
        debug!("Session {} ({:?}) closed.", self.session_id, self.addr);
    }
}
