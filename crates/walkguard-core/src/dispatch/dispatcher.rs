//! Dispatcher implementation.
//!
//! A dispatch fans out to every trusted contact of the alert owner. Sends
//! run concurrently on the blocking pool, one task per contact; a failure
//! for one contact never blocks delivery to the others, and nothing is ever
//! rolled back. Every attempt lands in the audit table, which is what makes
//! the restart recovery sweep idempotent per `(alert_id, contact_ref)`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tracing::{error, info, warn};

use crate::alert::{Alert, AlertStatus};
use crate::contacts::{ContactDirectory, TrustedContact};
use crate::error::Result;
use crate::events::Event;
use crate::gateway::SmsGateway;
use crate::storage::{Database, DispatchConfig};
use crate::CoreError;

use super::{compose_message, AttemptOutcome, DispatchOutcome, DispatchReport};

/// Retry policy for transient per-contact send failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure.
    pub max_retries: u32,
    /// Base backoff; doubles per attempt, with jitter.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &DispatchConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            base_delay: Duration::from_millis(cfg.retry_base_ms),
        }
    }

    /// Backoff before retry number `n` (1-based): base * 2^(n-1) plus up to
    /// half the base of jitter.
    fn backoff(&self, n: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        let exp = base.saturating_mul(1u64 << (n - 1).min(16));
        let jitter = rand::thread_rng().gen_range(0..=base / 2);
        Duration::from_millis(exp + jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&DispatchConfig::default())
    }
}

/// Fan-out of triggered alerts to trusted contacts.
pub struct Dispatcher {
    db: Arc<Mutex<Database>>,
    contacts: Arc<dyn ContactDirectory>,
    gateway: Arc<dyn SmsGateway>,
    policy: RetryPolicy,
}

impl Dispatcher {
    pub fn new(
        db: Arc<Mutex<Database>>,
        contacts: Arc<dyn ContactDirectory>,
        gateway: Arc<dyn SmsGateway>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            db,
            contacts,
            gateway,
            policy,
        }
    }

    /// Notify every trusted contact of the alert owner.
    ///
    /// Called exactly once per alert, by whichever actor won the transition
    /// into `triggered`. An empty contact list fails the whole dispatch with
    /// [`CoreError::NoContacts`] and makes no provider calls.
    pub async fn dispatch(&self, alert: &Alert) -> Result<DispatchReport> {
        let contacts = self.contacts.trusted_contacts(alert.user_id)?;
        if contacts.is_empty() {
            warn!(
                alert_id = alert.id,
                user_id = alert.user_id,
                "dispatch aborted: no trusted contacts"
            );
            self.db.lock().unwrap().append_event(&Event::DispatchNoContacts {
                alert_id: alert.id,
                user_id: alert.user_id,
                at: Utc::now(),
            })?;
            return Err(CoreError::NoContacts {
                user_id: alert.user_id,
            });
        }
        self.fan_out(alert, contacts, 0).await
    }

    /// Resume dispatch for triggered alerts whose attempt set does not cover
    /// every contact -- the process died mid-fan-out. Contacts already
    /// marked `sent` are never re-sent; contacts whose attempts all failed
    /// terminally are left to the operator.
    pub async fn recover(&self) -> Result<Vec<DispatchReport>> {
        let triggered = {
            let db = self.db.lock().unwrap();
            db.alerts_with_status(AlertStatus::Triggered)?
        };

        let mut reports = Vec::new();
        for alert in triggered {
            let contacts = self.contacts.trusted_contacts(alert.user_id)?;
            if contacts.is_empty() {
                continue;
            }
            let covered = {
                let db = self.db.lock().unwrap();
                db.contacts_with_attempts(alert.id)?
            };
            let unknown: Vec<TrustedContact> = contacts
                .iter()
                .filter(|c| !covered.contains(&c.phone))
                .cloned()
                .collect();
            if unknown.is_empty() {
                continue;
            }

            // Leave an audit mark for the contacts the sweep passes over.
            let mut skipped = 0;
            {
                let db = self.db.lock().unwrap();
                for contact in &contacts {
                    if db.contact_has_sent(alert.id, &contact.phone)? {
                        let number = db.next_attempt_number(alert.id, &contact.phone)?;
                        db.record_attempt(
                            alert.id,
                            &contact.phone,
                            number,
                            AttemptOutcome::Skipped,
                            Some("already notified"),
                            Utc::now(),
                        )?;
                        skipped += 1;
                    }
                }
            }

            info!(
                alert_id = alert.id,
                resuming = unknown.len(),
                skipped,
                "resuming incomplete dispatch"
            );
            reports.push(self.fan_out(&alert, unknown, skipped).await?);
        }
        Ok(reports)
    }

    async fn fan_out(
        &self,
        alert: &Alert,
        contacts: Vec<TrustedContact>,
        skipped: usize,
    ) -> Result<DispatchReport> {
        let body = compose_message(alert);
        let mut handles = Vec::with_capacity(contacts.len());
        for contact in contacts {
            let gateway = Arc::clone(&self.gateway);
            let db = Arc::clone(&self.db);
            let policy = self.policy.clone();
            let body = body.clone();
            let alert_id = alert.id;
            handles.push(tokio::task::spawn_blocking(move || {
                deliver(gateway.as_ref(), &db, &policy, alert_id, &contact.phone, &body)
            }));
        }

        let mut sent = 0;
        let mut failed = 0;
        for handle in handles {
            match handle.await {
                Ok(AttemptOutcome::Sent) => sent += 1,
                Ok(_) => failed += 1,
                Err(e) => {
                    error!(alert_id = alert.id, "delivery task panicked: {e}");
                    failed += 1;
                }
            }
        }

        let outcome = if failed == 0 {
            DispatchOutcome::Success
        } else if sent > 0 {
            DispatchOutcome::Partial
        } else {
            DispatchOutcome::Failed
        };
        let report = DispatchReport {
            alert_id: alert.id,
            outcome,
            sent,
            failed,
            skipped,
            at: Utc::now(),
        };

        self.db.lock().unwrap().append_event(&Event::DispatchCompleted {
            alert_id: alert.id,
            outcome,
            sent,
            failed,
            skipped,
            at: report.at,
        })?;
        info!(
            alert_id = alert.id,
            %outcome,
            sent,
            failed,
            "dispatch completed"
        );
        Ok(report)
    }
}

/// Deliver one message to one contact, retrying transient failures with
/// backoff. Runs on the blocking pool. Returns the terminal outcome for
/// this contact.
fn deliver(
    gateway: &dyn SmsGateway,
    db: &Arc<Mutex<Database>>,
    policy: &RetryPolicy,
    alert_id: i64,
    phone: &str,
    body: &str,
) -> AttemptOutcome {
    let mut attempt_number = {
        let db = db.lock().unwrap();
        db.next_attempt_number(alert_id, phone).unwrap_or(1)
    };
    let max_tries = policy.max_retries + 1;

    for try_index in 1..=max_tries {
        match gateway.send(phone, body) {
            Ok(()) => {
                let db = db.lock().unwrap();
                if let Err(e) = db.record_attempt(
                    alert_id,
                    phone,
                    attempt_number,
                    AttemptOutcome::Sent,
                    None,
                    Utc::now(),
                ) {
                    error!(alert_id, phone, "failed to record sent attempt: {e}");
                }
                if let Err(e) = db.append_event(&Event::ContactNotified {
                    alert_id,
                    contact_ref: phone.to_string(),
                    attempt_number,
                    at: Utc::now(),
                }) {
                    error!(alert_id, "failed to append event: {e}");
                }
                return AttemptOutcome::Sent;
            }
            Err(gateway_err) => {
                let permanent = !gateway_err.is_transient();
                {
                    let db = db.lock().unwrap();
                    if let Err(e) = db.record_attempt(
                        alert_id,
                        phone,
                        attempt_number,
                        AttemptOutcome::Failed,
                        Some(&gateway_err.to_string()),
                        Utc::now(),
                    ) {
                        error!(alert_id, phone, "failed to record failed attempt: {e}");
                    }
                }
                let exhausted = try_index == max_tries;
                if permanent || exhausted {
                    warn!(
                        alert_id,
                        phone,
                        permanent,
                        "delivery failed terminally: {gateway_err}"
                    );
                    let db = db.lock().unwrap();
                    if let Err(e) = db.append_event(&Event::ContactFailed {
                        alert_id,
                        contact_ref: phone.to_string(),
                        attempt_number,
                        permanent,
                        at: Utc::now(),
                    }) {
                        error!(alert_id, "failed to append event: {e}");
                    }
                    return AttemptOutcome::Failed;
                }
                warn!(
                    alert_id,
                    phone, try_index, "transient delivery failure, retrying: {gateway_err}"
                );
                std::thread::sleep(policy.backoff(try_index));
                attempt_number += 1;
            }
        }
    }
    AttemptOutcome::Failed
}
