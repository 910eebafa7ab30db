//! SQLite-based durable store for the alert lifecycle engine.
//!
//! Single source of truth for:
//! - Walk sessions (at most one active per user)
//! - Alerts and their status history
//! - Notification attempts (the dispatch audit trail)
//! - The event log
//!
//! Status transitions are expressed as guarded UPDATEs whose affected-row
//! count decides the race between concurrent writers; callers never read
//! then write in two steps.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::alert::{Alert, AlertKind, AlertStatus, GeoPoint};
use crate::contacts::TrustedContact;
use crate::dispatch::{AttemptOutcome, NotificationAttempt};
use crate::events::{Event, EventRecord};
use crate::session::{SessionStatus, WalkSession};

use super::{data_dir, migrations};

// === Helper Functions ===

/// Format alert status for database storage
fn format_alert_status(status: AlertStatus) -> &'static str {
    match status {
        AlertStatus::Pending => "pending",
        AlertStatus::Triggered => "triggered",
        AlertStatus::Cancelled => "cancelled",
        AlertStatus::Safe => "safe",
    }
}

/// Parse alert status from database string
fn parse_alert_status(status_str: &str) -> AlertStatus {
    match status_str {
        "triggered" => AlertStatus::Triggered,
        "cancelled" => AlertStatus::Cancelled,
        "safe" => AlertStatus::Safe,
        _ => AlertStatus::Pending,
    }
}

/// Parse alert kind from database string
fn parse_alert_kind(kind_str: &str) -> AlertKind {
    kind_str.parse().unwrap_or(AlertKind::Distress)
}

/// Format session status for database storage
fn format_session_status(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Active => "active",
        SessionStatus::Ended => "ended",
    }
}

/// Parse session status from database string
fn parse_session_status(status_str: &str) -> SessionStatus {
    match status_str {
        "ended" => SessionStatus::Ended,
        _ => SessionStatus::Active,
    }
}

/// Format attempt outcome for database storage
fn format_attempt_outcome(outcome: AttemptOutcome) -> &'static str {
    match outcome {
        AttemptOutcome::Sent => "sent",
        AttemptOutcome::Failed => "failed",
        AttemptOutcome::Skipped => "skipped",
    }
}

/// Parse attempt outcome from database string
fn parse_attempt_outcome(outcome_str: &str) -> AttemptOutcome {
    match outcome_str {
        "sent" => AttemptOutcome::Sent,
        "skipped" => AttemptOutcome::Skipped,
        _ => AttemptOutcome::Failed,
    }
}

/// Parse datetime from RFC3339 string with fallback to current time
fn parse_datetime_fallback(dt_str: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(dt_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_datetime_opt(dt_str: Option<String>) -> Option<DateTime<Utc>> {
    dt_str.map(|s| parse_datetime_fallback(&s))
}

fn location_from_columns(
    lat: Option<f64>,
    lng: Option<f64>,
    accuracy_m: Option<f64>,
) -> Option<GeoPoint> {
    match (lat, lng) {
        (Some(lat), Some(lng)) => Some(GeoPoint {
            lat,
            lng,
            accuracy_m,
        }),
        _ => None,
    }
}

/// Build a WalkSession from a database row
fn row_to_session(row: &rusqlite::Row) -> Result<WalkSession, rusqlite::Error> {
    let status_str: String = row.get(2)?;
    let start_time: String = row.get(3)?;
    let end_time: Option<String> = row.get(4)?;
    let last_seen_at: String = row.get(5)?;
    Ok(WalkSession {
        id: row.get(0)?,
        user_id: row.get(1)?,
        status: parse_session_status(&status_str),
        start_time: parse_datetime_fallback(&start_time),
        end_time: parse_datetime_opt(end_time),
        last_seen_at: parse_datetime_fallback(&last_seen_at),
        location: location_from_columns(row.get(6)?, row.get(7)?, None),
    })
}

/// Build an Alert from a database row
fn row_to_alert(row: &rusqlite::Row) -> Result<Alert, rusqlite::Error> {
    let kind_str: String = row.get(3)?;
    let status_str: String = row.get(5)?;
    let created_at: String = row.get(10)?;
    let triggered_at: Option<String> = row.get(11)?;
    let cancelled_at: Option<String> = row.get(12)?;
    Ok(Alert {
        id: row.get(0)?,
        user_id: row.get(1)?,
        session_id: row.get(2)?,
        kind: parse_alert_kind(&kind_str),
        confidence: row.get(4)?,
        status: parse_alert_status(&status_str),
        location: location_from_columns(row.get(6)?, row.get(7)?, row.get(8)?),
        snapshot_url: row.get(9)?,
        created_at: parse_datetime_fallback(&created_at),
        triggered_at: parse_datetime_opt(triggered_at),
        cancelled_at: parse_datetime_opt(cancelled_at),
    })
}

const ALERT_COLUMNS: &str = "id, user_id, session_id, kind, confidence, status, \
     location_lat, location_lng, location_accuracy_m, snapshot_url, \
     created_at, triggered_at, cancelled_at";

const SESSION_COLUMNS: &str =
    "id, user_id, status, start_time, end_time, last_seen_at, location_lat, location_lng";

/// A new alert before insertion. Status and timestamps are decided by the
/// engine, not the producer.
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub user_id: i64,
    pub session_id: Option<i64>,
    pub kind: AlertKind,
    pub confidence: f64,
    pub location: Option<GeoPoint>,
    pub snapshot_url: Option<String>,
}

/// SQLite database for walkguard state.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `~/.config/walkguard/walkguard.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, Box<dyn std::error::Error>> {
        let path = data_dir()?.join("walkguard.db");
        Self::open_at(&path)
    }

    /// Open the database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests and the sandbox).
    pub fn open_memory() -> Result<Self, Box<dyn std::error::Error>> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Path of the production database file.
    pub fn default_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        Ok(data_dir()?.join("walkguard.db"))
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        migrations::migrate(&self.conn)
    }

    // ── Walk sessions ────────────────────────────────────────────────

    /// Insert a new active session.
    ///
    /// The partial unique index on `(user_id) WHERE status = 'active'`
    /// rejects a second active session; callers map the constraint error to
    /// a conflict.
    pub fn insert_session(
        &self,
        user_id: i64,
        location: Option<GeoPoint>,
        now: DateTime<Utc>,
    ) -> Result<WalkSession, rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO walk_sessions (user_id, status, start_time, last_seen_at, location_lat, location_lng)
             VALUES (?1, 'active', ?2, ?2, ?3, ?4)",
            params![
                user_id,
                now.to_rfc3339(),
                location.map(|l| l.lat),
                location.map(|l| l.lng),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        Ok(WalkSession {
            id,
            user_id,
            status: SessionStatus::Active,
            start_time: now,
            end_time: None,
            last_seen_at: now,
            location,
        })
    }

    pub fn get_session(&self, id: i64) -> Result<Option<WalkSession>, rusqlite::Error> {
        self.conn
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM walk_sessions WHERE id = ?1"),
                params![id],
                row_to_session,
            )
            .optional()
    }

    pub fn active_session_for(&self, user_id: i64) -> Result<Option<WalkSession>, rusqlite::Error> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM walk_sessions
                     WHERE user_id = ?1 AND status = 'active'"
                ),
                params![user_id],
                row_to_session,
            )
            .optional()
    }

    pub fn sessions_for_user(&self, user_id: i64) -> Result<Vec<WalkSession>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM walk_sessions
             WHERE user_id = ?1 ORDER BY start_time DESC"
        ))?;
        let rows = stmt.query_map(params![user_id], row_to_session)?;
        rows.collect()
    }

    /// Atomically end a session if it is still active. Returns whether this
    /// call performed the transition.
    pub fn try_end_session(&self, id: i64, now: DateTime<Utc>) -> Result<bool, rusqlite::Error> {
        let changed = self.conn.execute(
            "UPDATE walk_sessions SET status = 'ended', end_time = ?2
             WHERE id = ?1 AND status = 'active'",
            params![id, now.to_rfc3339()],
        )?;
        Ok(changed == 1)
    }

    /// Refresh a session's heartbeat. Returns false for unknown or ended
    /// sessions.
    pub fn touch_session(&self, id: i64, now: DateTime<Utc>) -> Result<bool, rusqlite::Error> {
        let changed = self.conn.execute(
            "UPDATE walk_sessions SET last_seen_at = ?2
             WHERE id = ?1 AND status = 'active'",
            params![id, now.to_rfc3339()],
        )?;
        Ok(changed == 1)
    }

    /// Active sessions whose heartbeat is older than `cutoff`.
    pub fn idle_active_sessions(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<WalkSession>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM walk_sessions
             WHERE status = 'active' AND last_seen_at < ?1"
        ))?;
        let rows = stmt.query_map(params![cutoff.to_rfc3339()], row_to_session)?;
        rows.collect()
    }

    // ── Alerts ───────────────────────────────────────────────────────

    /// Insert an alert in the given initial status. `triggered_at` must be
    /// set exactly when the status is `triggered` (instant alerts).
    pub fn insert_alert(
        &self,
        new: &NewAlert,
        status: AlertStatus,
        created_at: DateTime<Utc>,
        triggered_at: Option<DateTime<Utc>>,
    ) -> Result<Alert, rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO alerts (user_id, session_id, kind, confidence, status,
                                 location_lat, location_lng, location_accuracy_m,
                                 snapshot_url, created_at, triggered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                new.user_id,
                new.session_id,
                new.kind.as_str(),
                new.confidence,
                format_alert_status(status),
                new.location.map(|l| l.lat),
                new.location.map(|l| l.lng),
                new.location.and_then(|l| l.accuracy_m),
                new.snapshot_url,
                created_at.to_rfc3339(),
                triggered_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        Ok(Alert {
            id,
            user_id: new.user_id,
            session_id: new.session_id,
            kind: new.kind,
            confidence: new.confidence,
            status,
            location: new.location,
            snapshot_url: new.snapshot_url.clone(),
            created_at,
            triggered_at,
            cancelled_at: None,
        })
    }

    pub fn get_alert(&self, id: i64) -> Result<Option<Alert>, rusqlite::Error> {
        self.conn
            .query_row(
                &format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?1"),
                params![id],
                row_to_alert,
            )
            .optional()
    }

    pub fn alerts_for_user(
        &self,
        user_id: i64,
        limit: u32,
    ) -> Result<Vec<Alert>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts
             WHERE user_id = ?1 ORDER BY created_at DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![user_id, limit], row_to_alert)?;
        rows.collect()
    }

    pub fn alerts_for_session(&self, session_id: i64) -> Result<Vec<Alert>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts
             WHERE session_id = ?1 ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map(params![session_id], row_to_alert)?;
        rows.collect()
    }

    pub fn alerts_with_status(&self, status: AlertStatus) -> Result<Vec<Alert>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts WHERE status = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![format_alert_status(status)], row_to_alert)?;
        rows.collect()
    }

    /// Compare-and-swap `pending -> triggered`. Exactly one of the countdown
    /// expiry and a concurrent cancel can win; the loser sees `false`.
    pub fn try_trigger_alert(&self, id: i64, at: DateTime<Utc>) -> Result<bool, rusqlite::Error> {
        let changed = self.conn.execute(
            "UPDATE alerts SET status = 'triggered', triggered_at = ?2
             WHERE id = ?1 AND status = 'pending'",
            params![id, at.to_rfc3339()],
        )?;
        Ok(changed == 1)
    }

    /// Compare-and-swap `pending -> cancelled`.
    pub fn try_cancel_alert(&self, id: i64, at: DateTime<Utc>) -> Result<bool, rusqlite::Error> {
        let changed = self.conn.execute(
            "UPDATE alerts SET status = 'cancelled', cancelled_at = ?2
             WHERE id = ?1 AND status = 'pending'",
            params![id, at.to_rfc3339()],
        )?;
        Ok(changed == 1)
    }

    /// Compare-and-swap `triggered -> safe`.
    pub fn try_mark_safe(&self, id: i64) -> Result<bool, rusqlite::Error> {
        let changed = self.conn.execute(
            "UPDATE alerts SET status = 'safe' WHERE id = ?1 AND status = 'triggered'",
            params![id],
        )?;
        Ok(changed == 1)
    }

    // ── Notification attempts ────────────────────────────────────────

    pub fn record_attempt(
        &self,
        alert_id: i64,
        contact_ref: &str,
        attempt_number: u32,
        outcome: AttemptOutcome,
        detail: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO notification_attempts
                 (alert_id, contact_ref, attempt_number, outcome, detail, at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                alert_id,
                contact_ref,
                attempt_number,
                format_attempt_outcome(outcome),
                detail,
                at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn attempts_for_alert(
        &self,
        alert_id: i64,
    ) -> Result<Vec<NotificationAttempt>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, alert_id, contact_ref, attempt_number, outcome, detail, at
             FROM notification_attempts WHERE alert_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![alert_id], |row| {
            let outcome_str: String = row.get(4)?;
            let at: String = row.get(6)?;
            Ok(NotificationAttempt {
                id: row.get(0)?,
                alert_id: row.get(1)?,
                contact_ref: row.get(2)?,
                attempt_number: row.get(3)?,
                outcome: parse_attempt_outcome(&outcome_str),
                detail: row.get(5)?,
                at: parse_datetime_fallback(&at),
            })
        })?;
        rows.collect()
    }

    /// Whether a contact already has a successful delivery for this alert.
    /// The recovery sweep keys idempotence on `(alert_id, contact_ref)`.
    pub fn contact_has_sent(
        &self,
        alert_id: i64,
        contact_ref: &str,
    ) -> Result<bool, rusqlite::Error> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM notification_attempts
             WHERE alert_id = ?1 AND contact_ref = ?2 AND outcome = 'sent'",
            params![alert_id, contact_ref],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Contacts that have at least one sent or failed attempt for this alert.
    pub fn contacts_with_attempts(
        &self,
        alert_id: i64,
    ) -> Result<HashSet<String>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT contact_ref FROM notification_attempts
             WHERE alert_id = ?1 AND outcome IN ('sent', 'failed')",
        )?;
        let rows = stmt.query_map(params![alert_id], |row| row.get::<_, String>(0))?;
        rows.collect()
    }

    /// Next attempt number for a contact, so recovery continues the sequence
    /// instead of restarting at 1.
    pub fn next_attempt_number(
        &self,
        alert_id: i64,
        contact_ref: &str,
    ) -> Result<u32, rusqlite::Error> {
        let max: u32 = self.conn.query_row(
            "SELECT COALESCE(MAX(attempt_number), 0) FROM notification_attempts
             WHERE alert_id = ?1 AND contact_ref = ?2",
            params![alert_id, contact_ref],
            |row| row.get(0),
        )?;
        Ok(max + 1)
    }

    // ── Trusted contacts (read side) ─────────────────────────────────

    /// The owner's trusted contacts in insertion order.
    pub fn trusted_contacts(&self, user_id: i64) -> Result<Vec<TrustedContact>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, phone, created_at FROM trusted_contacts
             WHERE user_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            let created_at: String = row.get(3)?;
            Ok(TrustedContact {
                id: row.get(0)?,
                user_id: row.get(1)?,
                phone: row.get(2)?,
                created_at: parse_datetime_fallback(&created_at),
            })
        })?;
        rows.collect()
    }

    /// Development plumbing: the contacts table is owned by the external
    /// contacts collaborator in production.
    pub fn insert_contact(
        &self,
        user_id: i64,
        phone: &str,
        now: DateTime<Utc>,
    ) -> Result<TrustedContact, rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO trusted_contacts (user_id, phone, created_at) VALUES (?1, ?2, ?3)",
            params![user_id, phone, now.to_rfc3339()],
        )?;
        Ok(TrustedContact {
            id: self.conn.last_insert_rowid(),
            user_id,
            phone: phone.to_string(),
            created_at: now,
        })
    }

    // ── Event log ────────────────────────────────────────────────────

    pub fn append_event(&self, event: &Event) -> Result<EventRecord, rusqlite::Error> {
        let payload = serde_json::to_string(event)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        let record = EventRecord {
            event_id: Uuid::new_v4().to_string(),
            alert_id: event.alert_id(),
            event: event.clone(),
            at: Utc::now(),
        };
        self.conn.execute(
            "INSERT INTO events (event_id, alert_id, payload, at) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.event_id,
                record.alert_id,
                payload,
                record.at.to_rfc3339(),
            ],
        )?;
        Ok(record)
    }

    pub fn events_for_alert(&self, alert_id: i64) -> Result<Vec<EventRecord>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, alert_id, payload, at FROM events
             WHERE alert_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![alert_id], |row| {
            let payload: String = row.get(2)?;
            let at: String = row.get(3)?;
            let event: Event = serde_json::from_str(&payload)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            Ok(EventRecord {
                event_id: row.get(0)?,
                alert_id: row.get(1)?,
                event,
                at: parse_datetime_fallback(&at),
            })
        })?;
        rows.collect()
    }
}
