use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE accounts (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE profiles (
                id          TEXT PRIMARY KEY REFERENCES accounts(id) ON DELETE CASCADE,
                name        TEXT NOT NULL,
                role        TEXT NOT NULL CHECK (role IN ('student', 'expert', 'admin')),
                created_at  TEXT NOT NULL
            );

            CREATE TABLE sessions (
                id          TEXT PRIMARY KEY,
                profile_id  TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE rooms (
                id          TEXT PRIMARY KEY,
                topic       TEXT NOT NULL,
                domain      TEXT NOT NULL,
                status      TEXT NOT NULL DEFAULT 'waiting'
                            CHECK (status IN ('waiting', 'live', 'completed')),
                host_id     TEXT NOT NULL REFERENCES profiles(id),
                meeting_url TEXT,
                version     INTEGER NOT NULL DEFAULT 1,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_rooms_status ON rooms(status, created_at);

            -- One row per admitted participant. Name and role are a snapshot
            -- taken at join time.
            CREATE TABLE room_participants (
                room_id     TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
                profile_id  TEXT NOT NULL REFERENCES profiles(id),
                name        TEXT NOT NULL,
                role        TEXT NOT NULL,
                position    INTEGER NOT NULL,
                joined_at   TEXT NOT NULL,
                PRIMARY KEY (room_id, profile_id)
            );

            CREATE TABLE feedback (
                id          TEXT PRIMARY KEY,
                room_id     TEXT NOT NULL REFERENCES rooms(id),
                student_id  TEXT NOT NULL REFERENCES profiles(id),
                author_id   TEXT NOT NULL REFERENCES profiles(id),
                rating      INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
                comment     TEXT,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_feedback_room ON feedback(room_id, created_at);
            CREATE INDEX idx_feedback_student ON feedback(student_id, created_at);

            -- Point balance is the sum of a profile's rows.
            CREATE TABLE point_transactions (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                profile_id  TEXT NOT NULL REFERENCES profiles(id),
                feedback_id TEXT REFERENCES feedback(id),
                delta       INTEGER NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_points_profile ON point_transactions(profile_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
