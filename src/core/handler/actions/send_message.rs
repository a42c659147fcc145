// src/core/handler/actions/send_message.rs

use crate::core::RelayError;
use crate::core::events::{EVENT_NEW_MESSAGE, Event, NewMessagePayload, SendMessagePayload};
use crate::core::handler::DispatchContext;
use chrono::Utc;
use tracing::debug;

/// Handles `send_message` by broadcasting a timestamped `new_message` to every
/// session in the sender's room, the sender included.
pub fn handle_send_message(event: &Event, ctx: &DispatchContext<'_>) -> Result<(), RelayError> {
    let message: SendMessagePayload = event.payload_as()?;
    let room = ctx.room()?;

    let outgoing = Event::new(
        EVENT_NEW_MESSAGE,
        &NewMessagePayload::stamped(message, Utc::now()),
    )?;
    let delivered = ctx.registry.broadcast_to_room(&room, outgoing);
    debug!(
        "Session {}: message fanned out to {} session(s) in room '{}'.",
        ctx.session_id, delivered, room
    );
    Ok(())
}
