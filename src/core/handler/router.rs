// src/core/handler/router.rs

//! The central component for routing decoded events to their handlers.
//!
//! The `Router` is built once at startup, when every event type is registered,
//! and is then shared read-only by all sessions. A session's reader loop hands
//! each decoded `Event` to [`Router::dispatch`] together with a
//! [`DispatchContext`] that identifies the issuing session and gives the
//! handler access to the registry.

use super::actions;
use crate::core::events::{EVENT_CHANGE_ROOM, EVENT_SEND_MESSAGE, Event};
use crate::core::registry::{Registry, SessionId};
use crate::core::{RelayError, metrics};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// A handler for one event type. Handlers run on the issuing session's reader
/// task and must not block: fanout goes through the registry's non-blocking
/// hand-off.
pub type EventHandler =
    Arc<dyn Fn(&Event, &DispatchContext<'_>) -> Result<(), RelayError> + Send + Sync>;

/// What a handler may see and touch while processing one event.
pub struct DispatchContext<'a> {
    pub session_id: SessionId,
    pub registry: &'a Registry,
}

impl<'a> DispatchContext<'a> {
    pub fn new(session_id: SessionId, registry: &'a Registry) -> Self {
        Self {
            session_id,
            registry,
        }
    }

    /// The issuing session's current room.
    pub fn room(&self) -> Result<String, RelayError> {
        self.registry.room_of(self.session_id).ok_or_else(|| {
            RelayError::Internal(format!("session {} is not registered", self.session_id))
        })
    }
}

/// Maps event type tags to handlers.
#[derive(Clone, Default)]
pub struct Router {
    handlers: HashMap<String, EventHandler>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&String> = self.handlers.keys().collect();
        kinds.sort();
        f.debug_struct("Router").field("handlers", &kinds).finish()
    }
}

impl Router {
    /// Creates a router with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a router with `send_message` and `change_room` registered.
    pub fn with_builtin_handlers() -> Self {
        let mut router = Self::new();
        router.register(
            EVENT_SEND_MESSAGE,
            actions::send_message::handle_send_message,
        );
        router.register(EVENT_CHANGE_ROOM, actions::change_room::handle_change_room);
        router
    }

    /// Registers `handler` for `kind`, replacing any previous handler.
    pub fn register<F>(&mut self, kind: impl Into<String>, handler: F)
    where
        F: Fn(&Event, &DispatchContext<'_>) -> Result<(), RelayError> + Send + Sync + 'static,
    {
        self.handlers.insert(kind.into(), Arc::new(handler));
    }

    pub fn supports(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Looks up the handler for `event` and runs it.
    pub fn dispatch(&self, event: &Event, ctx: &DispatchContext<'_>) -> Result<(), RelayError> {
        let handler = self
            .handlers
            .get(event.kind())
            .ok_or_else(|| RelayError::UnsupportedEventType(event.kind().to_string()))?;

        let start = Instant::now();
        handler(event, ctx)?;
        metrics::DISPATCH_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());
        metrics::EVENTS_DISPATCHED_TOTAL
            .with_label_values(&[event.kind()])
            .inc();
        Ok(())
    }
}
