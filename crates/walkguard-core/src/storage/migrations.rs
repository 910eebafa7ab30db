//! Database schema migrations for walkguard.
//!
//! Migrations are versioned and applied automatically when opening the
//! database. The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Apply all pending migrations to bring the database to the current schema
/// version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version     INTEGER PRIMARY KEY,
            applied_at  TEXT NOT NULL
        );",
    )
}

fn get_schema_version(conn: &Connection) -> i64 {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .unwrap_or(0)
}

fn set_schema_version(conn: &Connection, version: i64) -> SqliteResult<()> {
    conn.execute(
        "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![version, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

/// v1: walk sessions, alerts, notification attempts, trusted contacts,
/// event audit log.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS walk_sessions (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id         INTEGER NOT NULL,
            status          TEXT NOT NULL DEFAULT 'active',
            start_time      TEXT NOT NULL,
            end_time        TEXT,
            last_seen_at    TEXT NOT NULL,
            location_lat    REAL,
            location_lng    REAL
        );

        -- The per-user serialization point: at most one active session.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_walk_sessions_one_active
            ON walk_sessions(user_id) WHERE status = 'active';
        CREATE INDEX IF NOT EXISTS idx_walk_sessions_user
            ON walk_sessions(user_id);

        CREATE TABLE IF NOT EXISTS alerts (
            id                   INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id              INTEGER NOT NULL,
            session_id           INTEGER,
            kind                 TEXT NOT NULL,
            confidence           REAL NOT NULL,
            status               TEXT NOT NULL DEFAULT 'pending',
            location_lat         REAL,
            location_lng         REAL,
            location_accuracy_m  REAL,
            snapshot_url         TEXT,
            created_at           TEXT NOT NULL,
            triggered_at         TEXT,
            cancelled_at         TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_alerts_user ON alerts(user_id);
        CREATE INDEX IF NOT EXISTS idx_alerts_session ON alerts(session_id);
        CREATE INDEX IF NOT EXISTS idx_alerts_status ON alerts(status);

        CREATE TABLE IF NOT EXISTS notification_attempts (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            alert_id        INTEGER NOT NULL,
            contact_ref     TEXT NOT NULL,
            attempt_number  INTEGER NOT NULL,
            outcome         TEXT NOT NULL,
            detail          TEXT,
            at              TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_attempts_alert
            ON notification_attempts(alert_id);
        CREATE INDEX IF NOT EXISTS idx_attempts_alert_contact
            ON notification_attempts(alert_id, contact_ref);

        -- Read-only from the core's perspective; owned by the contacts
        -- collaborator. The CLI ships a dev-only seeding command.
        CREATE TABLE IF NOT EXISTS trusted_contacts (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     INTEGER NOT NULL,
            phone       TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_contacts_user ON trusted_contacts(user_id);

        CREATE TABLE IF NOT EXISTS events (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id    TEXT NOT NULL,
            alert_id    INTEGER,
            payload     TEXT NOT NULL,
            at          TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_events_alert ON events(alert_id);",
    )?;
    set_schema_version(conn, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), 1);
    }

    #[test]
    fn one_active_session_per_user_is_enforced() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn.execute(
            "INSERT INTO walk_sessions (user_id, status, start_time, last_seen_at)
             VALUES (1, 'active', '2026-01-01T00:00:00+00:00', '2026-01-01T00:00:00+00:00')",
            [],
        )
        .unwrap();
        let dup = conn.execute(
            "INSERT INTO walk_sessions (user_id, status, start_time, last_seen_at)
             VALUES (1, 'active', '2026-01-01T00:01:00+00:00', '2026-01-01T00:01:00+00:00')",
            [],
        );
        assert!(dup.is_err());
        // An ended session does not block a new active one.
        conn.execute(
            "INSERT INTO walk_sessions (user_id, status, start_time, last_seen_at)
             VALUES (2, 'ended', '2026-01-01T00:00:00+00:00', '2026-01-01T00:00:00+00:00')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO walk_sessions (user_id, status, start_time, last_seen_at)
             VALUES (2, 'active', '2026-01-01T00:01:00+00:00', '2026-01-01T00:01:00+00:00')",
            [],
        )
        .unwrap();
    }
}
