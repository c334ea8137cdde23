//! Rooms and their rosters.
//!
//! Membership lives in `room_participants`, one row per (room, profile) with
//! a primary key on the pair. Admission, departure and status changes each
//! run as a single transaction on the writer connection and bump
//! `rooms.version`, so concurrent joiners cannot overwrite each other and
//! subscribers can order the resulting snapshots.

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};
use uuid::Uuid;

use huddle_types::models::{Participant, Room, RoomStatus};

use crate::models::{ParticipantRow, RoomRow, room_from_rows};
use crate::{Database, now_timestamp};

#[derive(Debug)]
pub enum ActivateOutcome {
    /// This call moved the room from waiting to live.
    Activated(Room),
    /// The room was already live or completed.
    Unchanged(Room),
    NotFound,
}

#[derive(Debug)]
pub enum AdmitOutcome {
    Admitted(Room),
    AlreadyPresent(Room),
    /// Completed rooms accept nobody.
    Closed(Room),
    NotFound,
}

#[derive(Debug)]
pub enum LeaveOutcome {
    /// `Left.room.status` is `Completed` when the departure emptied a live room.
    Left(Room),
    NotPresent(Room),
    NotFound,
}

#[derive(Debug)]
pub enum CloseOutcome {
    Closed(Room),
    AlreadyClosed(Room),
    NotFound,
}

impl Database {
    pub fn create_room(
        &self,
        id: Uuid,
        topic: &str,
        domain: &str,
        host_id: Uuid,
        meeting_url: Option<&str>,
    ) -> Result<Room> {
        self.with_conn_mut(|conn| {
            let id = id.to_string();
            conn.execute(
                "INSERT INTO rooms (id, topic, domain, host_id, meeting_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, topic, domain, host_id.to_string(), meeting_url, now_timestamp()],
            )?;
            info!("Room {} created by {}: {:?}", id, host_id, topic);
            load_room(conn, &id)?.ok_or_else(|| anyhow::anyhow!("room {} vanished after insert", id))
        })
    }

    pub fn get_room(&self, id: Uuid) -> Result<Option<Room>> {
        self.with_conn(|conn| load_room(conn, &id.to_string()))
    }

    /// Rooms newest first, optionally restricted to one status.
    pub fn list_rooms(&self, status: Option<RoomStatus>) -> Result<Vec<Room>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM rooms WHERE (?1 IS NULL OR status = ?1) ORDER BY created_at DESC",
                RoomRow::COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([status.map(|s| s.as_str())], RoomRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
            let mut participants = query_participants_for_rooms(conn, &ids)?;

            rows.into_iter()
                .map(|row| {
                    let roster = participants.remove(&row.id).unwrap_or_default();
                    room_from_rows(row, roster)
                })
                .collect()
        })
    }

    /// First view load: `waiting -> live`. The conditional update makes the
    /// transition happen exactly once no matter how many viewers race.
    pub fn activate_room(&self, id: Uuid) -> Result<ActivateOutcome> {
        self.with_conn_mut(|conn| {
            let id = id.to_string();
            let changed = conn.execute(
                "UPDATE rooms SET status = 'live', version = version + 1
                 WHERE id = ?1 AND status = 'waiting'",
                [&id],
            )?;

            let Some(room) = load_room(conn, &id)? else {
                return Ok(ActivateOutcome::NotFound);
            };
            if changed == 1 {
                info!("Room {} is now live", id);
                Ok(ActivateOutcome::Activated(room))
            } else {
                Ok(ActivateOutcome::Unchanged(room))
            }
        })
    }

    /// Add `candidate` to the roster unless already present.
    ///
    /// The roster is read fresh inside the writer transaction, and the
    /// (room, profile) key rejects a second row for the same profile, so two
    /// concurrent joins from distinct profiles both survive.
    pub fn admit_participant(&self, room_id: Uuid, candidate: &Participant) -> Result<AdmitOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            let room_key = room_id.to_string();

            let Some(room) = load_room(&tx, &room_key)? else {
                return Ok(AdmitOutcome::NotFound);
            };
            if room.has_participant(candidate.id) {
                debug!("{} already on roster of {}", candidate.id, room_id);
                return Ok(AdmitOutcome::AlreadyPresent(room));
            }
            if room.status.is_terminal() {
                return Ok(AdmitOutcome::Closed(room));
            }

            let inserted = tx.execute(
                "INSERT OR IGNORE INTO room_participants (room_id, profile_id, name, role, position, joined_at)
                 VALUES (?1, ?2, ?3, ?4,
                         (SELECT COALESCE(MAX(position), 0) + 1 FROM room_participants WHERE room_id = ?1),
                         ?5)",
                rusqlite::params![
                    room_key,
                    candidate.id.to_string(),
                    candidate.name,
                    candidate.role.as_str(),
                    now_timestamp(),
                ],
            )?;
            if inserted == 0 {
                let room = load_room(&tx, &room_key)?
                    .ok_or_else(|| anyhow::anyhow!("room {} vanished during admission", room_id))?;
                return Ok(AdmitOutcome::AlreadyPresent(room));
            }
            bump_version(&tx, &room_key)?;

            let room = load_room(&tx, &room_key)?
                .ok_or_else(|| anyhow::anyhow!("room {} vanished during admission", room_id))?;
            tx.commit()?;

            info!(
                "{} ({}) admitted to room {} ({} on roster)",
                candidate.name,
                candidate.id,
                room_id,
                room.participants.len()
            );
            Ok(AdmitOutcome::Admitted(room))
        })
    }

    /// Remove a profile from the roster. A live room whose roster empties is
    /// completed in the same transaction.
    pub fn remove_participant(&self, room_id: Uuid, profile_id: Uuid) -> Result<LeaveOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            let room_key = room_id.to_string();

            let Some(room) = load_room(&tx, &room_key)? else {
                return Ok(LeaveOutcome::NotFound);
            };
            if !room.has_participant(profile_id) {
                return Ok(LeaveOutcome::NotPresent(room));
            }

            tx.execute(
                "DELETE FROM room_participants WHERE room_id = ?1 AND profile_id = ?2",
                (&room_key, profile_id.to_string()),
            )?;

            let emptied = room.participants.len() == 1;
            if emptied && room.status == RoomStatus::Live {
                tx.execute(
                    "UPDATE rooms SET status = 'completed' WHERE id = ?1",
                    [&room_key],
                )?;
                info!("Room {} completed: last participant left", room_id);
            }
            bump_version(&tx, &room_key)?;

            let room = load_room(&tx, &room_key)?
                .ok_or_else(|| anyhow::anyhow!("room {} vanished during departure", room_id))?;
            tx.commit()?;

            info!("{} left room {}", profile_id, room_id);
            Ok(LeaveOutcome::Left(room))
        })
    }

    /// Explicit close. Completed is terminal, so closing twice is harmless.
    pub fn close_room(&self, room_id: Uuid) -> Result<CloseOutcome> {
        self.with_conn_mut(|conn| {
            let room_key = room_id.to_string();
            let changed = conn.execute(
                "UPDATE rooms SET status = 'completed', version = version + 1
                 WHERE id = ?1 AND status != 'completed'",
                [&room_key],
            )?;

            let Some(room) = load_room(conn, &room_key)? else {
                return Ok(CloseOutcome::NotFound);
            };
            if changed == 1 {
                info!("Room {} closed", room_id);
                Ok(CloseOutcome::Closed(room))
            } else {
                Ok(CloseOutcome::AlreadyClosed(room))
            }
        })
    }
}

fn bump_version(conn: &Connection, room_key: &str) -> Result<()> {
    conn.execute("UPDATE rooms SET version = version + 1 WHERE id = ?1", [room_key])?;
    Ok(())
}

pub(crate) fn load_room(conn: &Connection, id: &str) -> Result<Option<Room>> {
    let sql = format!("SELECT {} FROM rooms WHERE id = ?1", RoomRow::COLUMNS);
    let Some(row) = conn.query_row(&sql, [id], RoomRow::from_row).optional()? else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT room_id, profile_id, name, role FROM room_participants
         WHERE room_id = ?1 ORDER BY position",
    )?;
    let participants = stmt
        .query_map([id], participant_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    room_from_rows(row, participants).map(Some)
}

/// Batch-fetch rosters for a set of rooms, keyed by room id, each in join order.
fn query_participants_for_rooms(
    conn: &Connection,
    room_ids: &[String],
) -> Result<std::collections::HashMap<String, Vec<ParticipantRow>>> {
    let mut by_room: std::collections::HashMap<String, Vec<ParticipantRow>> =
        std::collections::HashMap::new();
    if room_ids.is_empty() {
        return Ok(by_room);
    }

    let placeholders: Vec<String> = (1..=room_ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT room_id, profile_id, name, role FROM room_participants
         WHERE room_id IN ({}) ORDER BY room_id, position",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(room_ids.iter()), participant_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for row in rows {
        by_room.entry(row.room_id.clone()).or_default().push(row);
    }
    Ok(by_room)
}

fn participant_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ParticipantRow> {
    Ok(ParticipantRow {
        room_id: row.get(0)?,
        profile_id: row.get(1)?,
        name: row.get(2)?,
        role: row.get(3)?,
    })
}
