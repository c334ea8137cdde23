use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use huddle_types::models::{Profile, Role};

use crate::models::{AccountRow, ProfileRow};
use crate::{Database, now_timestamp};

impl Database {
    // -- Accounts --

    /// Create the login identity and its profile together, so a profile can
    /// never be missing for a valid account.
    pub fn create_account(
        &self,
        id: Uuid,
        username: &str,
        password_hash: &str,
        name: &str,
        role: Role,
    ) -> Result<Profile> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            let profile = insert_identity(&tx, id, username, password_hash, name, role)?;
            tx.commit()?;
            Ok(profile)
        })
    }

    /// Sign-up: account, profile and the first session in one transaction.
    /// If any insert fails, none of them remain.
    pub fn register_account(
        &self,
        id: Uuid,
        username: &str,
        password_hash: &str,
        name: &str,
        role: Role,
        session_id: Uuid,
    ) -> Result<Profile> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            let profile = insert_identity(&tx, id, username, password_hash, name, role)?;
            tx.execute(
                "INSERT INTO sessions (id, profile_id, created_at) VALUES (?1, ?2, ?3)",
                (session_id.to_string(), id.to_string(), now_timestamp()),
            )?;
            tx.commit()?;
            Ok(profile)
        })
    }

    pub fn get_account_by_username(&self, username: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, username, password FROM accounts WHERE username = ?1",
                    [username],
                    |row| {
                        Ok(AccountRow {
                            id: row.get(0)?,
                            username: row.get(1)?,
                            password: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    // -- Profiles --

    pub fn get_profile(&self, id: Uuid) -> Result<Option<Profile>> {
        self.with_conn(|conn| query_profile(conn, &id.to_string()))
    }

    /// Renames a profile. Roster snapshots taken earlier keep the old name.
    pub fn update_profile_name(&self, id: Uuid, name: &str) -> Result<Option<Profile>> {
        self.with_conn_mut(|conn| {
            let id = id.to_string();
            let changed = conn.execute("UPDATE profiles SET name = ?1 WHERE id = ?2", (name, &id))?;
            if changed == 0 {
                return Ok(None);
            }
            query_profile(conn, &id)
        })
    }

    pub fn set_profile_role(&self, id: Uuid, role: Role) -> Result<Option<Profile>> {
        self.with_conn_mut(|conn| {
            let id = id.to_string();
            let changed = conn.execute(
                "UPDATE profiles SET role = ?1 WHERE id = ?2",
                (role.as_str(), &id),
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_profile(conn, &id)
        })
    }

    pub fn points_for(&self, profile_id: Uuid) -> Result<i64> {
        self.with_conn(|conn| sum_points(conn, &profile_id.to_string()))
    }

    // -- Sessions --

    pub fn create_session(&self, id: Uuid, profile_id: Uuid) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, profile_id, created_at) VALUES (?1, ?2, ?3)",
                (id.to_string(), profile_id.to_string(), now_timestamp()),
            )?;
            Ok(())
        })
    }

    pub fn session_is_active(&self, id: Uuid, profile_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM sessions WHERE id = ?1 AND profile_id = ?2",
                    (id.to_string(), profile_id.to_string()),
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Returns false when the session was already gone.
    pub fn delete_session(&self, id: Uuid) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute("DELETE FROM sessions WHERE id = ?1", [id.to_string()])?;
            Ok(removed > 0)
        })
    }

    /// Drop sessions created before `cutoff`. Their tokens have expired.
    pub fn prune_sessions(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let cutoff = cutoff.to_rfc3339_opts(SecondsFormat::Micros, true);
        self.with_conn_mut(|conn| {
            let removed = conn.execute("DELETE FROM sessions WHERE created_at < ?1", [cutoff])?;
            Ok(removed)
        })
    }
}

fn insert_identity(
    conn: &Connection,
    id: Uuid,
    username: &str,
    password_hash: &str,
    name: &str,
    role: Role,
) -> Result<Profile> {
    let now = now_timestamp();
    let id = id.to_string();

    conn.execute(
        "INSERT INTO accounts (id, username, password, created_at) VALUES (?1, ?2, ?3, ?4)",
        (&id, username, password_hash, &now),
    )?;
    conn.execute(
        "INSERT INTO profiles (id, name, role, created_at) VALUES (?1, ?2, ?3, ?4)",
        (&id, name, role.as_str(), &now),
    )?;

    query_profile(conn, &id)?.ok_or_else(|| anyhow::anyhow!("profile {} vanished after insert", id))
}

pub(crate) fn query_profile(conn: &Connection, id: &str) -> Result<Option<Profile>> {
    let sql = format!("SELECT {} FROM profiles p WHERE p.id = ?1", ProfileRow::COLUMNS);
    let row = conn.query_row(&sql, [id], ProfileRow::from_row).optional()?;
    row.map(Profile::try_from).transpose()
}

pub(crate) fn sum_points(conn: &Connection, profile_id: &str) -> Result<i64> {
    let points = conn.query_row(
        "SELECT COALESCE(SUM(delta), 0) FROM point_transactions WHERE profile_id = ?1",
        [profile_id],
        |row| row.get(0),
    )?;
    Ok(points)
}
