use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Feedback, Role, Room};

/// Row-level change published on the in-process change feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChangeEvent {
    /// A room row or its roster changed. Carries the full room at `room.version`.
    RoomUpdated { room: Room },

    /// A rating was recorded. `points` is the rated profile's balance after it.
    FeedbackCreated { feedback: Feedback, points: i64 },
}

impl ChangeEvent {
    pub fn room_id(&self) -> Uuid {
        match self {
            Self::RoomUpdated { room } => room.id,
            Self::FeedbackCreated { feedback, .. } => feedback.room_id,
        }
    }

    /// The profile a feedback event is about. Room events have none.
    pub fn rated_profile_id(&self) -> Option<Uuid> {
        match self {
            Self::RoomUpdated { .. } => None,
            Self::FeedbackCreated { feedback, .. } => Some(feedback.student_id),
        }
    }
}

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready {
        profile_id: Uuid,
        name: String,
        role: Role,
    },

    /// Initial state of a watched room
    RoomSnapshot { room: Room, feedback: Vec<Feedback> },

    /// The watched room moved to a newer version
    RoomUpdated { room: Room },

    /// A rating was posted in the watched room, or about this user
    FeedbackCreated { feedback: Feedback },

    /// Something the user should see as a toast
    Notification { message: String },

    /// The user's point balance changed
    ProfileRefresh { points: i64 },

    /// The watched room completed; the client should leave the view
    SessionClosed { room_id: Uuid },

    /// A command failed
    Error { message: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Open the live view of a room, replacing any previous one
    WatchRoom { room_id: Uuid },

    /// Close the current live view
    UnwatchRoom,
}
