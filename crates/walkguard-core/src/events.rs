use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::AlertKind;
use crate::dispatch::DispatchOutcome;

/// Every lifecycle transition in the system produces an Event.
/// Events are appended to the durable audit log; the CLI reads them back
/// for alert history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    SessionStarted {
        session_id: i64,
        user_id: i64,
        at: DateTime<Utc>,
    },
    SessionEnded {
        session_id: i64,
        user_id: i64,
        at: DateTime<Utc>,
    },
    AlertSubmitted {
        alert_id: i64,
        user_id: i64,
        kind: AlertKind,
        confidence: f64,
        instant: bool,
        at: DateTime<Utc>,
    },
    /// A countdown timer was armed for a pending alert.
    CountdownArmed {
        alert_id: i64,
        delay_ms: u64,
        at: DateTime<Utc>,
    },
    AlertTriggered {
        alert_id: i64,
        at: DateTime<Utc>,
    },
    AlertCancelled {
        alert_id: i64,
        at: DateTime<Utc>,
    },
    AlertMarkedSafe {
        alert_id: i64,
        at: DateTime<Utc>,
    },
    /// A single contact was notified successfully.
    ContactNotified {
        alert_id: i64,
        contact_ref: String,
        attempt_number: u32,
        at: DateTime<Utc>,
    },
    /// Delivery to a single contact failed terminally (permanent error or
    /// retries exhausted).
    ContactFailed {
        alert_id: i64,
        contact_ref: String,
        attempt_number: u32,
        permanent: bool,
        at: DateTime<Utc>,
    },
    /// Fan-out for a triggered alert finished.
    DispatchCompleted {
        alert_id: i64,
        outcome: DispatchOutcome,
        sent: usize,
        failed: usize,
        skipped: usize,
        at: DateTime<Utc>,
    },
    /// Fan-out was aborted because the owner has no trusted contacts.
    DispatchNoContacts {
        alert_id: i64,
        user_id: i64,
        at: DateTime<Utc>,
    },
}

impl Event {
    /// The alert this event belongs to, if any.
    pub fn alert_id(&self) -> Option<i64> {
        match self {
            Event::SessionStarted { .. } | Event::SessionEnded { .. } => None,
            Event::AlertSubmitted { alert_id, .. }
            | Event::CountdownArmed { alert_id, .. }
            | Event::AlertTriggered { alert_id, .. }
            | Event::AlertCancelled { alert_id, .. }
            | Event::AlertMarkedSafe { alert_id, .. }
            | Event::ContactNotified { alert_id, .. }
            | Event::ContactFailed { alert_id, .. }
            | Event::DispatchCompleted { alert_id, .. }
            | Event::DispatchNoContacts { alert_id, .. } => Some(*alert_id),
        }
    }
}

/// A persisted event row from the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Stable identifier assigned at append time.
    pub event_id: String,
    pub alert_id: Option<i64>,
    pub event: Event,
    pub at: DateTime<Utc>,
}
