// src/connection/mod.rs

//! Manages the lifecycle of a single client session: the reader and writer loops,
//! keepalive, and teardown.

mod guard;
mod handler;
mod session;

pub use guard::ConnectionGuard;
pub use handler::ConnectionHandler;
pub use session::{SessionLifecycle, SessionStatus};
