//! Database row types. These map directly to SQLite rows and are converted
//! into `huddle_types` models at the crate boundary, where ids, tags and
//! timestamps are validated.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Row;
use uuid::Uuid;

use huddle_types::models::{Feedback, Participant, Profile, Role, Room, RoomStatus};

pub struct AccountRow {
    pub id: String,
    pub username: String,
    pub password: String,
}

pub struct ProfileRow {
    pub id: String,
    pub name: String,
    pub role: String,
    pub points: i64,
    pub created_at: String,
}

impl ProfileRow {
    pub(crate) const COLUMNS: &'static str = "p.id, p.name, p.role, \
         COALESCE((SELECT SUM(t.delta) FROM point_transactions t WHERE t.profile_id = p.id), 0), \
         p.created_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            role: row.get(2)?,
            points: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

pub struct RoomRow {
    pub id: String,
    pub topic: String,
    pub domain: String,
    pub status: String,
    pub host_id: String,
    pub meeting_url: Option<String>,
    pub version: i64,
    pub created_at: String,
}

impl RoomRow {
    pub(crate) const COLUMNS: &'static str =
        "id, topic, domain, status, host_id, meeting_url, version, created_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            topic: row.get(1)?,
            domain: row.get(2)?,
            status: row.get(3)?,
            host_id: row.get(4)?,
            meeting_url: row.get(5)?,
            version: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

pub struct ParticipantRow {
    pub room_id: String,
    pub profile_id: String,
    pub name: String,
    pub role: String,
}

pub struct FeedbackRow {
    pub id: String,
    pub room_id: String,
    pub student_id: String,
    pub author_id: String,
    pub rating: i64,
    pub comment: Option<String>,
    pub created_at: String,
}

impl FeedbackRow {
    pub(crate) const COLUMNS: &'static str =
        "id, room_id, student_id, author_id, rating, comment, created_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            room_id: row.get(1)?,
            student_id: row.get(2)?,
            author_id: row.get(3)?,
            rating: row.get(4)?,
            comment: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

// -- Boundary conversions --

pub(crate) fn parse_id(raw: &str, what: &str) -> Result<Uuid> {
    raw.parse()
        .with_context(|| format!("corrupt {} id {:?}", what, raw))
}

/// Accepts RFC 3339 (what this crate writes) and SQLite's
/// `YYYY-MM-DD HH:MM:SS` (what `datetime('now')` produces).
pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|ndt| ndt.and_utc())
        .with_context(|| format!("corrupt timestamp {:?}", raw))
}

impl TryFrom<ProfileRow> for Profile {
    type Error = anyhow::Error;

    fn try_from(row: ProfileRow) -> Result<Self> {
        Ok(Profile {
            id: parse_id(&row.id, "profile")?,
            role: row.role.parse::<Role>()?,
            points: row.points,
            created_at: parse_timestamp(&row.created_at)?,
            name: row.name,
        })
    }
}

impl TryFrom<ParticipantRow> for Participant {
    type Error = anyhow::Error;

    fn try_from(row: ParticipantRow) -> Result<Self> {
        Ok(Participant {
            id: parse_id(&row.profile_id, "participant")?,
            role: row.role.parse::<Role>()?,
            name: row.name,
        })
    }
}

impl TryFrom<FeedbackRow> for Feedback {
    type Error = anyhow::Error;

    fn try_from(row: FeedbackRow) -> Result<Self> {
        let rating = u8::try_from(row.rating)
            .ok()
            .filter(|r| (1..=5).contains(r))
            .ok_or_else(|| anyhow!("corrupt rating {} on feedback {}", row.rating, row.id))?;

        Ok(Feedback {
            id: parse_id(&row.id, "feedback")?,
            room_id: parse_id(&row.room_id, "room")?,
            student_id: parse_id(&row.student_id, "student")?,
            author_id: parse_id(&row.author_id, "author")?,
            rating,
            comment: row.comment,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

/// Assemble a room from its row and its roster rows (already in join order).
pub(crate) fn room_from_rows(row: RoomRow, participants: Vec<ParticipantRow>) -> Result<Room> {
    let participants = participants
        .into_iter()
        .map(Participant::try_from)
        .collect::<Result<Vec<_>>>()?;

    Ok(Room {
        id: parse_id(&row.id, "room")?,
        status: row.status.parse::<RoomStatus>()?,
        host_id: parse_id(&row.host_id, "host")?,
        created_at: parse_timestamp(&row.created_at)?,
        topic: row.topic,
        domain: row.domain,
        meeting_url: row.meeting_url,
        version: row.version,
        participants,
    })
}
