use anyhow::Result;
use uuid::Uuid;

use huddle_db::Database;
use huddle_db::roster::ActivateOutcome;
use huddle_types::events::ChangeEvent;
use huddle_types::models::{Feedback, Room};

use crate::dispatcher::Dispatcher;

/// Load a room for viewing. The first load of a waiting room makes it live,
/// and that transition is published to everyone watching.
///
/// Blocking: call from `spawn_blocking`.
pub fn load_room_view(
    db: &Database,
    dispatcher: &Dispatcher,
    room_id: Uuid,
) -> Result<Option<(Room, Vec<Feedback>)>> {
    let room = match db.activate_room(room_id)? {
        ActivateOutcome::Activated(room) => {
            dispatcher.publish(ChangeEvent::RoomUpdated { room: room.clone() });
            room
        }
        ActivateOutcome::Unchanged(room) => room,
        ActivateOutcome::NotFound => return Ok(None),
    };

    let feedback = db.list_feedback_for_room(room_id)?;
    Ok(Some((room, feedback)))
}
