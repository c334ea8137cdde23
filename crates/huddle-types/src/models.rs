use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Raised when a stored or submitted tag does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Expert,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Expert => "expert",
            Self::Admin => "admin",
        }
    }

    /// Experts and admins may rate participants and open rooms.
    pub fn can_evaluate(&self) -> bool {
        matches!(self, Self::Expert | Self::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Self::Student),
            "expert" => Ok(Self::Expert),
            "admin" => Ok(Self::Admin),
            other => Err(UnknownVariant {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

/// Room lifecycle: `Waiting -> Live -> Completed`. `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Live,
    #[serde(alias = "ended")]
    Completed,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Live => "live",
            Self::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoomStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "live" => Ok(Self::Live),
            "completed" | "ended" => Ok(Self::Completed),
            other => Err(UnknownVariant {
                kind: "room status",
                value: other.to_string(),
            }),
        }
    }
}

/// Snapshot of a profile taken when it joined a room. Later profile edits
/// do not reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
    pub points: i64,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub fn as_participant(&self) -> Participant {
        Participant {
            id: self.id,
            name: self.name.clone(),
            role: self.role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub topic: String,
    pub domain: String,
    pub status: RoomStatus,
    /// Participants in join order.
    pub participants: Vec<Participant>,
    pub host_id: Uuid,
    /// Never serialized; handed out only through an admission response.
    #[serde(skip_serializing, default)]
    pub meeting_url: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Bumped on every change to the room row or its roster.
    pub version: i64,
}

impl Room {
    pub fn has_participant(&self, id: Uuid) -> bool {
        self.participants.iter().any(|p| p.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub id: Uuid,
    pub room_id: Uuid,
    pub student_id: Uuid,
    pub author_id: Uuid,
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Points awarded per rating star.
pub const POINTS_PER_STAR: i64 = 10;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

pub fn points_for_rating(rating: u8) -> i64 {
    i64::from(rating) * POINTS_PER_STAR
}
