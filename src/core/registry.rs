// src/core/registry.rs

//! The registry of live sessions.
//!
//! Sessions are identified by a monotonically increasing `SessionId` and stored
//! in a sharded `DashMap`; membership of the map *is* membership of the set of
//! live sessions. Each entry owns the sending half of its session's outbound
//! queue and shutdown signal, so removing the entry is what tears the session's
//! loops down.

use crate::connection::{SessionLifecycle, SessionStatus};
use crate::core::events::Event;
use crate::core::{RelayError, metrics};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

/// Stable identity of a session for its whole lifetime.
pub type SessionId = u64;
/// Sender half of a session's outbound queue.
pub type OutboundSender = broadcast::Sender<Arc<Event>>;
/// Sender half of a session's shutdown signal.
pub type ShutdownSender = broadcast::Sender<()>;

/// The room every session starts in until it sends `change_room`.
pub const DEFAULT_ROOM: &str = "";
/// Default capacity of each session's outbound queue.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

/// The registry-side view of one session.
#[derive(Debug)]
pub struct SessionEntry {
    pub addr: Option<SocketAddr>,
    pub room: String,
    outbound: OutboundSender,
    shutdown: ShutdownSender,
    lifecycle: Arc<SessionLifecycle>,
}

/// Everything the connection handler needs to drive a newly added session.
#[derive(Debug)]
pub struct SessionChannels {
    pub id: SessionId,
    pub outbound_rx: broadcast::Receiver<Arc<Event>>,
    pub shutdown_rx: broadcast::Receiver<()>,
    pub lifecycle: Arc<SessionLifecycle>,
}

/// Capacity held for a session that is not in the registry yet. Dropping an
/// unclaimed slot gives the capacity back.
#[derive(Debug)]
pub struct SessionSlot {
    registry: Arc<Registry>,
    claimed: bool,
}

impl SessionSlot {
    /// Turns the reservation into a live, `Active` session.
    pub fn claim(mut self, addr: Option<SocketAddr>) -> SessionChannels {
        self.claimed = true;
        self.registry.insert_entry(addr)
    }
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        if !self.claimed {
            self.registry.reserved.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// The shared set of all live sessions.
#[derive(Debug)]
pub struct Registry {
    sessions: DashMap<SessionId, SessionEntry>,
    next_id: AtomicU64,
    /// Slots taken by `add` or `reserve`, released by `remove` or by dropping an
    /// unclaimed `SessionSlot`. Bounds the registry size without a registry-wide
    /// lock.
    reserved: AtomicUsize,
    max_sessions: usize,
    outbound_capacity: usize,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(usize::MAX, DEFAULT_OUTBOUND_CAPACITY)
    }
}

impl Registry {
    pub fn new(max_sessions: usize, outbound_capacity: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU64::new(0),
            reserved: AtomicUsize::new(0),
            max_sessions,
            outbound_capacity: outbound_capacity.max(1),
        }
    }

    /// Takes a slot and inserts a new session into it.
    pub fn add(&self, addr: Option<SocketAddr>) -> Result<SessionChannels, RelayError> {
        self.take_slot()?;
        Ok(self.insert_entry(addr))
    }

    /// Takes a slot without creating a session, so capacity can be checked
    /// before any other work is done for a connection. The session itself is
    /// created by `SessionSlot::claim`.
    pub fn reserve(self: &Arc<Self>) -> Result<SessionSlot, RelayError> {
        self.take_slot()?;
        Ok(SessionSlot {
            registry: self.clone(),
            claimed: false,
        })
    }

    fn take_slot(&self) -> Result<(), RelayError> {
        if self.reserved.fetch_add(1, Ordering::SeqCst) >= self.max_sessions {
            self.reserved.fetch_sub(1, Ordering::SeqCst);
            return Err(RelayError::SessionLimitReached(self.max_sessions));
        }
        Ok(())
    }

    /// Builds a complete session entry and inserts it into a slot already taken.
    /// The entry is only visible to enumeration once fully constructed; the
    /// session becomes `Active` as soon as the insert has happened.
    fn insert_entry(&self, addr: Option<SocketAddr>) -> SessionChannels {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let (outbound, outbound_rx) = broadcast::channel(self.outbound_capacity);
        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let lifecycle = Arc::new(SessionLifecycle::new());

        let entry = SessionEntry {
            addr,
            room: DEFAULT_ROOM.to_string(),
            outbound,
            shutdown,
            lifecycle: lifecycle.clone(),
        };
        self.sessions.insert(id, entry);
        lifecycle.activate();

        metrics::ACTIVE_SESSIONS.inc();
        metrics::SESSIONS_OPENED_TOTAL.inc();
        debug!("Session {} added to the registry.", id);

        SessionChannels {
            id,
            outbound_rx,
            shutdown_rx,
            lifecycle,
        }
    }

    /// Removes a session and signals its loops to stop. Idempotent: returns
    /// `false` if the session was already removed.
    ///
    /// Dropping the entry drops the last long-lived sender of the outbound queue,
    /// which makes the writer send a close frame and close the transport.
    pub fn remove(&self, id: SessionId) -> bool {
        let Some((_, entry)) = self.sessions.remove(&id) else {
            return false;
        };
        self.reserved.fetch_sub(1, Ordering::SeqCst);
        entry.lifecycle.begin_closing();
        // The reader may already be gone; that is fine.
        let _ = entry.shutdown.send(());
        metrics::ACTIVE_SESSIONS.dec();
        debug!("Session {} removed from the registry.", id);
        true
    }

    /// Removes every session. Used on server shutdown.
    pub fn close_all(&self) -> usize {
        let ids: Vec<SessionId> = self.sessions.iter().map(|e| *e.key()).collect();
        ids.into_iter().filter(|id| self.remove(*id)).count()
    }

    /// Moves a session to another room. Returns false for unknown sessions.
    pub fn set_room(&self, id: SessionId, room: &str) -> bool {
        match self.sessions.get_mut(&id) {
            Some(mut entry) => {
                entry.room = room.to_string();
                true
            }
            None => false,
        }
    }

    /// The current room of a session.
    pub fn room_of(&self, id: SessionId) -> Option<String> {
        self.sessions.get(&id).map(|e| e.room.clone())
    }

    /// The lifecycle status of a registered session.
    pub fn status_of(&self, id: SessionId) -> Option<SessionStatus> {
        self.sessions.get(&id).map(|e| e.lifecycle.status())
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Ids of the sessions currently in `room`.
    pub fn members_of(&self, room: &str) -> Vec<SessionId> {
        self.sessions
            .iter()
            .filter(|e| e.room == room)
            .map(|e| *e.key())
            .collect()
    }

    /// Enqueues `event` on every session whose room equals `room`.
    pub fn broadcast_to_room(&self, room: &str, event: Event) -> usize {
        self.broadcast_where(|_, entry_room| entry_room == room, event)
    }

    /// Enqueues `event` on every session matching `predicate`, returning the
    /// number of queues that accepted it.
    ///
    /// Target senders are collected first and the shard locks released before any
    /// hand-off. The hand-off itself never blocks: a full queue overwrites its
    /// oldest undelivered event and the writer reports the lag.
    pub fn broadcast_where<F>(&self, predicate: F, event: Event) -> usize
    where
        F: Fn(SessionId, &str) -> bool,
    {
        let targets: Vec<OutboundSender> = self
            .sessions
            .iter()
            .filter(|e| predicate(*e.key(), &e.room))
            .map(|e| e.outbound.clone())
            .collect();

        let event = Arc::new(event);
        targets
            .into_iter()
            .filter(|tx| tx.send(event.clone()).is_ok())
            .count()
    }

    /// Enqueues `event` on a single session.
    pub fn send_to(&self, id: SessionId, event: Event) -> bool {
        let Some(tx) = self.sessions.get(&id).map(|e| e.outbound.clone()) else {
            return false;
        };
        tx.send(Arc::new(event)).is_ok()
    }
}
