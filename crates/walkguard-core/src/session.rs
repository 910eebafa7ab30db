//! Walk session registry.
//!
//! Tracks at most one active session per user and supplies the session
//! context alerts attach to. Stopping a session never cascades into pending
//! alerts: an in-flight countdown keeps running so an emergency cannot be
//! silently suppressed by ending the walk.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::alert::GeoPoint;
use crate::error::Result;
use crate::events::Event;
use crate::storage::Database;
use crate::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Ended,
}

/// A user's walk session record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkSession {
    pub id: i64,
    pub user_id: i64,
    pub status: SessionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Heartbeat used by the idle sweep.
    pub last_seen_at: DateTime<Utc>,
    pub location: Option<GeoPoint>,
}

/// Registry for walk sessions.
pub struct SessionRegistry {
    db: Arc<Mutex<Database>>,
}

impl SessionRegistry {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    /// Start a new walk session.
    ///
    /// Rejects with a conflict if the user already has an active session;
    /// silently replacing it would orphan alerts bound to the old session.
    /// The partial unique index backs this up against concurrent starts.
    pub fn start_session(
        &self,
        user_id: i64,
        location: Option<GeoPoint>,
    ) -> Result<WalkSession> {
        let db = self.db.lock().unwrap();
        if db.active_session_for(user_id)?.is_some() {
            return Err(CoreError::Conflict(format!(
                "user {user_id} already has an active walk session"
            )));
        }
        let session = db
            .insert_session(user_id, location, Utc::now())
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    CoreError::Conflict(format!(
                        "user {user_id} already has an active walk session"
                    ))
                }
                other => other.into(),
            })?;
        db.append_event(&Event::SessionStarted {
            session_id: session.id,
            user_id,
            at: session.start_time,
        })?;
        info!(session_id = session.id, user_id, "walk session started");
        Ok(session)
    }

    /// Stop an active walk session.
    ///
    /// Pending alerts tied to the session keep their countdowns.
    pub fn stop_session(&self, session_id: i64) -> Result<WalkSession> {
        let db = self.db.lock().unwrap();
        let now = Utc::now();
        if db.try_end_session(session_id, now)? {
            let session = db
                .get_session(session_id)?
                .ok_or(CoreError::NotFound {
                    entity: "walk session",
                    id: session_id,
                })?;
            db.append_event(&Event::SessionEnded {
                session_id,
                user_id: session.user_id,
                at: now,
            })?;
            info!(session_id, "walk session ended");
            return Ok(session);
        }
        match db.get_session(session_id)? {
            None => Err(CoreError::NotFound {
                entity: "walk session",
                id: session_id,
            }),
            Some(_) => Err(CoreError::InvalidState(format!(
                "walk session {session_id} is already ended"
            ))),
        }
    }

    /// Refresh a session's heartbeat.
    pub fn touch(&self, session_id: i64) -> Result<()> {
        let db = self.db.lock().unwrap();
        if db.touch_session(session_id, Utc::now())? {
            Ok(())
        } else {
            match db.get_session(session_id)? {
                None => Err(CoreError::NotFound {
                    entity: "walk session",
                    id: session_id,
                }),
                Some(_) => Err(CoreError::InvalidState(format!(
                    "walk session {session_id} is already ended"
                ))),
            }
        }
    }

    /// End active sessions whose heartbeat is older than the grace period.
    /// Returns the sessions that were ended by this sweep.
    pub fn end_idle_sessions(&self, grace: Duration) -> Result<Vec<WalkSession>> {
        let db = self.db.lock().unwrap();
        let now = Utc::now();
        let cutoff = now - chrono::Duration::from_std(grace).unwrap_or(chrono::Duration::zero());
        let idle = db.idle_active_sessions(cutoff)?;
        let mut ended = Vec::new();
        for session in idle {
            if db.try_end_session(session.id, now)? {
                db.append_event(&Event::SessionEnded {
                    session_id: session.id,
                    user_id: session.user_id,
                    at: now,
                })?;
                info!(session_id = session.id, "idle walk session ended by sweep");
                ended.push(db.get_session(session.id)?.unwrap_or(session));
            }
        }
        Ok(ended)
    }

    pub fn get_session(&self, session_id: i64) -> Result<WalkSession> {
        let db = self.db.lock().unwrap();
        db.get_session(session_id)?.ok_or(CoreError::NotFound {
            entity: "walk session",
            id: session_id,
        })
    }

    pub fn active_session(&self, user_id: i64) -> Result<Option<WalkSession>> {
        let db = self.db.lock().unwrap();
        Ok(db.active_session_for(user_id)?)
    }

    pub fn sessions_for_user(&self, user_id: i64) -> Result<Vec<WalkSession>> {
        let db = self.db.lock().unwrap();
        Ok(db.sessions_for_user(user_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(Arc::new(Mutex::new(Database::open_memory().unwrap())))
    }

    #[test]
    fn second_active_session_is_rejected() {
        let registry = registry();
        registry.start_session(1, None).unwrap();
        let err = registry.start_session(1, None).unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
        // A different user is unaffected.
        registry.start_session(2, None).unwrap();
    }

    #[test]
    fn stop_then_start_again() {
        let registry = registry();
        let session = registry.start_session(1, None).unwrap();
        let stopped = registry.stop_session(session.id).unwrap();
        assert_eq!(stopped.status, SessionStatus::Ended);
        assert!(stopped.end_time.is_some());
        registry.start_session(1, None).unwrap();
    }

    #[test]
    fn stop_twice_is_invalid_state() {
        let registry = registry();
        let session = registry.start_session(1, None).unwrap();
        registry.stop_session(session.id).unwrap();
        let err = registry.stop_session(session.id).unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
    }

    #[test]
    fn stop_unknown_is_not_found() {
        let registry = registry();
        let err = registry.stop_session(999).unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[test]
    fn idle_sweep_ends_only_stale_sessions() {
        let registry = registry();
        let session = registry.start_session(1, None).unwrap();
        registry.start_session(2, None).unwrap();

        // Backdate the first session's heartbeat.
        {
            let db = registry.db.lock().unwrap();
            let stale = (Utc::now() - chrono::Duration::seconds(3600)).to_rfc3339();
            db.conn()
                .execute(
                    "UPDATE walk_sessions SET last_seen_at = ?1 WHERE id = ?2",
                    rusqlite::params![stale, session.id],
                )
                .unwrap();
        }

        let ended = registry.end_idle_sessions(Duration::from_secs(900)).unwrap();
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].id, session.id);
        assert!(registry.active_session(2).unwrap().is_some());
    }
}
