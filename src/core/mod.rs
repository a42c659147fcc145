// src/core/mod.rs

//! The central module containing the core logic and data structures of roomcast.

pub mod auth;
pub mod errors;
pub mod events;
pub mod handler;
pub mod metrics;
pub mod otp;
pub mod registry;
pub mod state;

pub use errors::RelayError;
pub use events::Event;
pub use registry::{Registry, SessionId};
