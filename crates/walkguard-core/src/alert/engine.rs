//! Alert lifecycle engine.
//!
//! Owns the countdown timers for pending alerts and the transitions of the
//! alert state machine. Every transition is a compare-and-swap against the
//! store; the in-memory timer registry is only an optimization (it lets a
//! cancel abort the sleeping task early). A timer that fires after a cancel
//! loses the CAS and becomes a no-op, so the race between a human
//! cancellation and countdown expiry always has exactly one winner.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::events::Event;
use crate::storage::database::NewAlert;
use crate::storage::Database;
use crate::CoreError;

use super::{Alert, AlertStatus};

/// Result of a restart recovery pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoverySummary {
    /// Pending alerts whose deadline had already elapsed; fired and
    /// dispatched.
    pub fired_overdue: usize,
    /// Pending alerts re-armed with their remaining countdown.
    pub rearmed: usize,
    /// Triggered alerts whose fan-out was resumed.
    pub resumed_dispatches: usize,
}

/// The alert state machine plus countdown scheduling.
pub struct AlertEngine {
    db: Arc<Mutex<Database>>,
    dispatcher: Arc<Dispatcher>,
    countdown: Duration,
    timers: Arc<Mutex<HashMap<i64, JoinHandle<()>>>>,
}

impl AlertEngine {
    pub fn new(db: Arc<Mutex<Database>>, dispatcher: Dispatcher, countdown: Duration) -> Self {
        Self {
            db,
            dispatcher: Arc::new(dispatcher),
            countdown,
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create an alert from an accepted candidate.
    ///
    /// Instant alerts are created directly in `triggered` and handed to the
    /// dispatcher before this returns; the dispatch outcome is recorded in
    /// the event log and never mutates the alert. Countdown alerts are
    /// created `pending`, a timer is armed, and the call returns
    /// immediately.
    pub async fn submit(&self, new: NewAlert, instant: bool) -> Result<Alert> {
        let now = Utc::now();

        if instant {
            let alert = {
                let db = self.db.lock().unwrap();
                let alert = db.insert_alert(&new, AlertStatus::Triggered, now, Some(now))?;
                db.append_event(&Event::AlertSubmitted {
                    alert_id: alert.id,
                    user_id: alert.user_id,
                    kind: alert.kind,
                    confidence: alert.confidence,
                    instant: true,
                    at: now,
                })?;
                db.append_event(&Event::AlertTriggered {
                    alert_id: alert.id,
                    at: now,
                })?;
                alert
            };
            info!(alert_id = alert.id, kind = %alert.kind, "instant alert triggered");
            match self.dispatcher.dispatch(&alert).await {
                Ok(report) => info!(
                    alert_id = alert.id,
                    outcome = %report.outcome,
                    "instant alert dispatched"
                ),
                Err(CoreError::NoContacts { user_id }) => warn!(
                    alert_id = alert.id,
                    user_id, "instant alert had no contacts to notify"
                ),
                Err(e) => error!(alert_id = alert.id, "instant alert dispatch failed: {e}"),
            }
            return self.get_alert(alert.id);
        }

        let alert = {
            let db = self.db.lock().unwrap();
            let alert = db.insert_alert(&new, AlertStatus::Pending, now, None)?;
            db.append_event(&Event::AlertSubmitted {
                alert_id: alert.id,
                user_id: alert.user_id,
                kind: alert.kind,
                confidence: alert.confidence,
                instant: false,
                at: now,
            })?;
            db.append_event(&Event::CountdownArmed {
                alert_id: alert.id,
                delay_ms: self.countdown.as_millis() as u64,
                at: now,
            })?;
            alert
        };
        info!(
            alert_id = alert.id,
            kind = %alert.kind,
            delay_ms = self.countdown.as_millis() as u64,
            "alert pending, countdown armed"
        );
        self.arm_countdown(alert.id, self.countdown);
        Ok(alert)
    }

    /// Cancel a pending alert.
    ///
    /// Wins if and only if the cancel CAS reaches the store before the
    /// countdown's. Losing is a recoverable condition, not a fault: the
    /// caller must tell the user the contacts may already have been
    /// notified.
    pub fn cancel(&self, alert_id: i64) -> Result<Alert> {
        let now = Utc::now();
        let won = {
            let db = self.db.lock().unwrap();
            db.try_cancel_alert(alert_id, now)?
        };
        if won {
            if let Some(handle) = self.timers.lock().unwrap().remove(&alert_id) {
                handle.abort();
            }
            self.db.lock().unwrap().append_event(&Event::AlertCancelled {
                alert_id,
                at: now,
            })?;
            info!(alert_id, "alert cancelled before countdown elapsed");
            return self.get_alert(alert_id);
        }
        let alert = self.get_alert(alert_id)?;
        Err(CoreError::InvalidState(format!(
            "alert {alert_id} is no longer pending (status: {}); \
             contacts may already have been notified",
            alert.status
        )))
    }

    /// Mark a triggered alert as resolved safe. Idempotent once safe.
    pub fn mark_safe(&self, alert_id: i64) -> Result<Alert> {
        let marked = {
            let db = self.db.lock().unwrap();
            let marked = db.try_mark_safe(alert_id)?;
            if marked {
                db.append_event(&Event::AlertMarkedSafe {
                    alert_id,
                    at: Utc::now(),
                })?;
            }
            marked
        };
        if marked {
            info!(alert_id, "alert marked safe");
            return self.get_alert(alert_id);
        }
        let alert = self.get_alert(alert_id)?;
        match alert.status {
            AlertStatus::Safe => Ok(alert),
            status => Err(CoreError::InvalidState(format!(
                "alert {alert_id} cannot be marked safe from status {status}"
            ))),
        }
    }

    pub fn get_alert(&self, alert_id: i64) -> Result<Alert> {
        let db = self.db.lock().unwrap();
        db.get_alert(alert_id)?.ok_or(CoreError::NotFound {
            entity: "alert",
            id: alert_id,
        })
    }

    /// Alert ids with a live countdown task in this process.
    pub fn armed_countdowns(&self) -> Vec<i64> {
        self.timers.lock().unwrap().keys().copied().collect()
    }

    /// Poll until the alert leaves `pending`. Used by callers that want to
    /// ride out the countdown in-process.
    pub async fn wait_until_resolved(&self, alert_id: i64) -> Result<Alert> {
        loop {
            let alert = self.get_alert(alert_id)?;
            if alert.status != AlertStatus::Pending {
                return Ok(alert);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Restart recovery: fire overdue pending alerts, re-arm the rest, then
    /// resume incomplete fan-outs.
    pub async fn recover(&self) -> Result<RecoverySummary> {
        let pending = {
            let db = self.db.lock().unwrap();
            db.alerts_with_status(AlertStatus::Pending)?
        };
        let now = Utc::now();
        let countdown =
            chrono::Duration::from_std(self.countdown).unwrap_or(chrono::Duration::zero());

        let mut fired_overdue = 0;
        let mut rearmed = 0;
        for alert in pending {
            let deadline = alert.created_at + countdown;
            if deadline <= now {
                warn!(alert_id = alert.id, "overdue pending alert found, firing");
                fire(
                    Arc::clone(&self.db),
                    Arc::clone(&self.dispatcher),
                    alert.id,
                )
                .await;
                fired_overdue += 1;
            } else {
                let remaining = (deadline - now).to_std().unwrap_or(Duration::ZERO);
                info!(
                    alert_id = alert.id,
                    remaining_ms = remaining.as_millis() as u64,
                    "re-arming pending alert countdown"
                );
                self.arm_countdown(alert.id, remaining);
                rearmed += 1;
            }
        }

        let reports = self.dispatcher.recover().await?;
        Ok(RecoverySummary {
            fired_overdue,
            rearmed,
            resumed_dispatches: reports.len(),
        })
    }

    fn arm_countdown(&self, alert_id: i64, delay: Duration) {
        let db = Arc::clone(&self.db);
        let dispatcher = Arc::clone(&self.dispatcher);
        let timers = Arc::clone(&self.timers);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fire(db, dispatcher, alert_id).await;
            timers.lock().unwrap().remove(&alert_id);
        });
        self.timers.lock().unwrap().insert(alert_id, handle);
    }
}

/// Countdown completion: CAS into `triggered` and dispatch if this actor
/// won. Loses silently to a cancel that landed first.
async fn fire(db: Arc<Mutex<Database>>, dispatcher: Arc<Dispatcher>, alert_id: i64) {
    let now = Utc::now();
    let won = {
        let db = db.lock().unwrap();
        match db.try_trigger_alert(alert_id, now) {
            Ok(won) => won,
            Err(e) => {
                error!(alert_id, "countdown trigger CAS failed: {e}");
                return;
            }
        }
    };
    if !won {
        info!(alert_id, "countdown fired after cancellation, no-op");
        return;
    }

    {
        let db = db.lock().unwrap();
        if let Err(e) = db.append_event(&Event::AlertTriggered { alert_id, at: now }) {
            error!(alert_id, "failed to append event: {e}");
        }
    }
    info!(alert_id, "countdown elapsed, alert triggered");

    let alert = {
        let db = db.lock().unwrap();
        match db.get_alert(alert_id) {
            Ok(Some(alert)) => alert,
            Ok(None) => {
                error!(alert_id, "triggered alert vanished before dispatch");
                return;
            }
            Err(e) => {
                error!(alert_id, "failed to load triggered alert: {e}");
                return;
            }
        }
    };
    match dispatcher.dispatch(&alert).await {
        Ok(report) => info!(
            alert_id,
            outcome = %report.outcome,
            sent = report.sent,
            failed = report.failed,
            "triggered alert dispatched"
        ),
        Err(CoreError::NoContacts { user_id }) => {
            warn!(alert_id, user_id, "triggered alert had no contacts to notify")
        }
        Err(e) => error!(alert_id, "dispatch failed: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::StaticContactDirectory;
    use crate::dispatch::RetryPolicy;
    use crate::gateway::SandboxGateway;
    use crate::alert::AlertKind;

    fn engine_with(
        gateway: Arc<SandboxGateway>,
        contacts: StaticContactDirectory,
        countdown: Duration,
    ) -> AlertEngine {
        let db = Arc::new(Mutex::new(Database::open_memory().unwrap()));
        let dispatcher = Dispatcher::new(
            Arc::clone(&db),
            Arc::new(contacts),
            gateway,
            RetryPolicy {
                max_retries: 0,
                base_delay: Duration::from_millis(1),
            },
        );
        AlertEngine::new(db, dispatcher, countdown)
    }

    fn candidate(user_id: i64) -> NewAlert {
        NewAlert {
            user_id,
            session_id: None,
            kind: AlertKind::Scream,
            confidence: 0.95,
            location: None,
            snapshot_url: None,
        }
    }

    #[tokio::test]
    async fn instant_alert_dispatches_without_timer() {
        let gateway = Arc::new(SandboxGateway::new());
        let engine = engine_with(
            Arc::clone(&gateway),
            StaticContactDirectory::new(1, &["+15550001", "+15550002"]),
            Duration::from_secs(60),
        );

        let alert = engine.submit(candidate(1), true).await.unwrap();
        assert_eq!(alert.status, AlertStatus::Triggered);
        assert!(alert.triggered_at.is_some());
        assert_eq!(gateway.sent_count(), 2);
        assert!(engine.armed_countdowns().is_empty());
    }

    #[tokio::test]
    async fn cancel_before_expiry_prevents_dispatch() {
        let gateway = Arc::new(SandboxGateway::new());
        let engine = engine_with(
            Arc::clone(&gateway),
            StaticContactDirectory::new(1, &["+15550001"]),
            Duration::from_secs(30),
        );

        let alert = engine.submit(candidate(1), false).await.unwrap();
        assert_eq!(alert.status, AlertStatus::Pending);

        let cancelled = engine.cancel(alert.id).unwrap();
        assert_eq!(cancelled.status, AlertStatus::Cancelled);
        assert!(cancelled.cancelled_at.is_some());
        assert!(cancelled.triggered_at.is_none());
        assert_eq!(gateway.sent_count(), 0);
    }

    #[tokio::test]
    async fn cancel_after_expiry_is_invalid_state() {
        let gateway = Arc::new(SandboxGateway::new());
        let engine = engine_with(
            Arc::clone(&gateway),
            StaticContactDirectory::new(1, &["+15550001"]),
            Duration::from_millis(20),
        );

        let alert = engine.submit(candidate(1), false).await.unwrap();
        let resolved = engine.wait_until_resolved(alert.id).await.unwrap();
        assert_eq!(resolved.status, AlertStatus::Triggered);

        let err = engine.cancel(alert.id).unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
        // Dispatch happened exactly once.
        assert_eq!(gateway.sent_count(), 1);
    }

    #[tokio::test]
    async fn mark_safe_is_idempotent_from_triggered_only() {
        let gateway = Arc::new(SandboxGateway::new());
        let engine = engine_with(
            Arc::clone(&gateway),
            StaticContactDirectory::new(1, &["+15550001"]),
            Duration::from_secs(30),
        );

        let pending = engine.submit(candidate(1), false).await.unwrap();
        assert!(matches!(
            engine.mark_safe(pending.id).unwrap_err(),
            CoreError::InvalidState(_)
        ));

        let instant = engine.submit(candidate(1), true).await.unwrap();
        let safe = engine.mark_safe(instant.id).unwrap();
        assert_eq!(safe.status, AlertStatus::Safe);
        let again = engine.mark_safe(instant.id).unwrap();
        assert_eq!(again.status, AlertStatus::Safe);
    }

    #[tokio::test]
    async fn cancel_unknown_alert_is_not_found() {
        let engine = engine_with(
            Arc::new(SandboxGateway::new()),
            StaticContactDirectory::empty(),
            Duration::from_secs(5),
        );
        assert!(matches!(
            engine.cancel(4242).unwrap_err(),
            CoreError::NotFound { .. }
        ));
    }
}
