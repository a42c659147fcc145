// src/core/handler/actions/mod.rs

// Declare all action modules.
// The router registers them via `actions::module::function`.
pub mod change_room;
pub mod send_message;
