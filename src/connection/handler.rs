// src/connection/handler.rs

//! Defines the `ConnectionHandler` which manages the full lifecycle of a session.
//!
//! Every session runs two tasks over the two halves of its transport:
//!
//! * the **reader** pulls frames, decodes them into events and dispatches them
//!   through the router. It also enforces the liveness deadline: a read that has
//!   not completed by the deadline ends the session, and every pong pushes the
//!   deadline forward.
//! * the **writer** drains the session's outbound queue into text frames and
//!   sends a ping every `ping_interval`. When the queue is closed it sends a
//!   close frame and closes the sink.
//!
//! Whichever task ends first removes the session from the registry. Removal
//! signals the reader to stop and closes the outbound queue, which in turn stops
//! the writer, so both tasks always terminate together.

use super::guard::ConnectionGuard;
use super::session::SessionLifecycle;
use crate::core::events::Event;
use crate::core::handler::DispatchContext;
use crate::core::registry::{SessionChannels, SessionId, SessionSlot};
use crate::core::state::ServerState;
use crate::core::{RelayError, metrics};
use axum::extract::ws::Message;
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

/// Manages the full lifecycle of one session.
///
/// The session is registered as soon as the handler is created. If the handler
/// is dropped without being run, its guard removes the session again.
pub struct ConnectionHandler {
    state: Arc<ServerState>,
    channels: SessionChannels,
    guard: ConnectionGuard,
}

impl ConnectionHandler {
    /// Adds a new session to the registry. On success the session is `Active`
    /// and visible to broadcasts.
    pub fn open(state: Arc<ServerState>, addr: Option<SocketAddr>) -> Result<Self, RelayError> {
        let slot = state.registry.reserve()?;
        Ok(Self::attach(state, slot, addr))
    }

    /// Registers a session in a slot reserved earlier with `Registry::reserve`.
    pub fn attach(state: Arc<ServerState>, slot: SessionSlot, addr: Option<SocketAddr>) -> Self {
        let channels = slot.claim(addr);
        state.stats.increment_total_sessions();
        let guard = ConnectionGuard::new(
            state.registry.clone(),
            channels.id,
            addr,
            channels.lifecycle.clone(),
        );
        Self {
            state,
            channels,
            guard,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.channels.id
    }

    pub fn lifecycle(&self) -> Arc<SessionLifecycle> {
        self.channels.lifecycle.clone()
    }

    /// Runs the reader and writer until both have exited, then releases the
    /// session. `sink` and `stream` are the two halves of the session's transport.
    pub async fn run<K, S, E>(self, sink: K, stream: S)
    where
        K: Sink<Message> + Unpin + Send + 'static,
        K::Error: Into<RelayError>,
        S: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
        E: Into<RelayError> + Send + 'static,
    {
        let Self {
            state,
            channels,
            guard,
        } = self;
        let SessionChannels {
            id,
            outbound_rx,
            shutdown_rx,
            ..
        } = channels;
        let registry = state.registry.clone();
        let session_config = &state.config.session;

        let reader = SessionReader {
            id,
            state: state.clone(),
            shutdown_rx,
            max_message_size: session_config.max_message_size,
            pong_wait: session_config.pong_wait,
        };
        let writer = SessionWriter {
            id,
            outbound_rx,
            ping_interval: session_config.ping_interval(),
        };

        let reader_registry = registry.clone();
        let reader_task = tokio::spawn(async move {
            let result = reader.run(stream).await;
            log_loop_exit(id, "reader", &result);
            reader_registry.remove(id);
        });

        let writer_registry = registry;
        let writer_task = tokio::spawn(async move {
            let result = writer.run(sink).await;
            log_loop_exit(id, "writer", &result);
            writer_registry.remove(id);
        });

        let (reader_res, writer_res) = tokio::join!(reader_task, writer_task);
        for (name, res) in [("reader", reader_res), ("writer", writer_res)] {
            if let Err(e) = res
                && e.is_panic()
            {
                error!("Session {}: {} task panicked: {e:?}", id, name);
            }
        }
        drop(guard);
    }
}

/// Logs why a session loop ended. Normal disconnects are not worth a warning.
fn log_loop_exit(id: SessionId, name: &str, result: &Result<(), RelayError>) {
    match result {
        Ok(()) => debug!("Session {}: {} loop finished.", id, name),
        Err(e) if e.is_normal_disconnect() => {
            debug!("Session {}: {} loop ended by peer: {}", id, name, e)
        }
        Err(RelayError::LivenessTimeout) => {
            metrics::LIVENESS_TIMEOUTS_TOTAL.inc();
            warn!("Session {}: peer stopped answering keepalive probes, closing.", id);
        }
        Err(e) => warn!("Session {}: {} loop terminated: {}", id, name, e),
    }
}

/// The inbound half of a session.
struct SessionReader {
    id: SessionId,
    state: Arc<ServerState>,
    shutdown_rx: broadcast::Receiver<()>,
    max_message_size: usize,
    pong_wait: Duration,
}

impl SessionReader {
    async fn run<S, E>(mut self, mut stream: S) -> Result<(), RelayError>
    where
        S: Stream<Item = Result<Message, E>> + Unpin,
        E: Into<RelayError>,
    {
        let mut deadline = Instant::now() + self.pong_wait;
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => {
                    debug!("Session {}: reader received shutdown signal.", self.id);
                    return Ok(());
                }
                next = tokio::time::timeout_at(deadline, stream.next()) => {
                    let frame = match next {
                        Err(_) => return Err(RelayError::LivenessTimeout),
                        Ok(None) => {
                            debug!("Session {}: transport closed by peer.", self.id);
                            return Ok(());
                        }
                        Ok(Some(Err(e))) => return Err(e.into()),
                        Ok(Some(Ok(frame))) => frame,
                    };
                    match frame {
                        Message::Text(text) => self.process_frame(text.as_str().as_bytes())?,
                        Message::Binary(data) => self.process_frame(&data)?,
                        Message::Pong(_) => {
                            deadline = Instant::now() + self.pong_wait;
                        }
                        // Pings from the peer are answered by the transport itself.
                        Message::Ping(_) => {}
                        Message::Close(frame) => {
                            debug!("Session {}: peer sent close frame {:?}.", self.id, frame);
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Decodes and dispatches one data frame. Only an oversized frame is an
    /// error here; decode and dispatch failures are logged and swallowed.
    fn process_frame(&self, bytes: &[u8]) -> Result<(), RelayError> {
        if bytes.len() > self.max_message_size {
            return Err(RelayError::MessageTooLarge {
                size: bytes.len(),
                limit: self.max_message_size,
            });
        }

        self.state.stats.increment_total_events();
        let outcome = Event::decode(bytes).and_then(|event| {
            debug!("Session {}: received '{}' event.", self.id, event.kind());
            let ctx = DispatchContext::new(self.id, &self.state.registry);
            self.state.router.dispatch(&event, &ctx)
        });

        if let Err(e) = outcome {
            metrics::EVENTS_REJECTED_TOTAL.inc();
            self.state.stats.increment_rejected_events();
            warn!("Session {}: error handling inbound event: {}", self.id, e);
        }
        Ok(())
    }
}

/// The outbound half of a session.
struct SessionWriter {
    id: SessionId,
    outbound_rx: broadcast::Receiver<Arc<Event>>,
    ping_interval: Duration,
}

impl SessionWriter {
    async fn run<K>(mut self, mut sink: K) -> Result<(), RelayError>
    where
        K: Sink<Message> + Unpin,
        K::Error: Into<RelayError>,
    {
        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.ping_interval, self.ping_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                received = self.outbound_rx.recv() => match received {
                    Ok(event) => {
                        let text = event.encode()?;
                        sink.send(Message::Text(text.into()))
                            .await
                            .map_err(Into::<RelayError>::into)?;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        metrics::OUTBOUND_DROPPED_TOTAL.inc_by(skipped as f64);
                        warn!(
                            "Session {}: outbound queue overflowed, dropped {} oldest event(s).",
                            self.id, skipped
                        );
                    }
                    Err(RecvError::Closed) => {
                        debug!("Session {}: outbound queue closed, closing transport.", self.id);
                        if let Err(e) = sink.send(Message::Close(None)).await {
                            let e: RelayError = e.into();
                            debug!("Session {}: close frame not delivered: {}", self.id, e);
                        }
                        let _ = sink.close().await;
                        return Ok(());
                    }
                },
                _ = ticker.tick() => {
                    sink.send(Message::Ping(Bytes::new()))
                        .await
                        .map_err(Into::<RelayError>::into)?;
                }
            }
        }
    }
}
