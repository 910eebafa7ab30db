//! Notification dispatch: fan-out of a triggered alert to all trusted
//! contacts, with bounded retries, partial-failure accounting, and a
//! restart recovery sweep.

mod dispatcher;
mod message;

pub use dispatcher::{Dispatcher, RetryPolicy};
pub use message::compose_message;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal result of one delivery effort for one contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    Sent,
    Failed,
    /// The recovery sweep passed over a contact that was already notified.
    Skipped,
}

/// One row of the dispatch audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationAttempt {
    pub id: i64,
    pub alert_id: i64,
    pub contact_ref: String,
    pub attempt_number: u32,
    pub outcome: AttemptOutcome,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

/// Aggregate outcome of a fan-out.
///
/// The alert's own status is never affected by this: a triggered alert with
/// a failed dispatch stays triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchOutcome {
    /// Every contact was notified.
    Success,
    /// Some contacts were notified, some were not.
    Partial,
    /// No contact was notified.
    Failed,
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DispatchOutcome::Success => "success",
            DispatchOutcome::Partial => "partial",
            DispatchOutcome::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Summary of one dispatch (or resumed dispatch) of an alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchReport {
    pub alert_id: i64,
    pub outcome: DispatchOutcome,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
    pub at: DateTime<Utc>,
}
