// src/core/handler/actions/change_room.rs

use crate::core::RelayError;
use crate::core::events::{ChangeRoomPayload, Event};
use crate::core::handler::DispatchContext;
use tracing::debug;

/// Handles `change_room`. Rooms are implicit: any name is accepted and a room
/// exists for as long as some session is in it.
pub fn handle_change_room(event: &Event, ctx: &DispatchContext<'_>) -> Result<(), RelayError> {
    let change: ChangeRoomPayload = event.payload_as()?;

    if !ctx.registry.set_room(ctx.session_id, &change.name) {
        return Err(RelayError::Internal(format!(
            "session {} is not registered",
            ctx.session_id
        )));
    }
    debug!("Session {} moved to room '{}'.", ctx.session_id, change.name);
    Ok(())
}
