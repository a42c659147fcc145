// src/core/handler/mod.rs

//! Routing of inbound events to their handlers.

// Declare the actions submodule here, in the parent module file.
mod actions;

pub mod router;

pub use router::{DispatchContext, EventHandler, Router};
