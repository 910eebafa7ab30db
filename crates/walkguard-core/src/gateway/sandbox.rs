//! Recording no-op gateway for development and tests.
//!
//! Records every send instead of hitting the provider. Failures can be
//! scripted per phone number so dispatcher retry and aggregation paths are
//! testable without a network.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::GatewayError;

use super::SmsGateway;

/// A message the sandbox accepted instead of sending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedSms {
    pub phone: String,
    pub body: String,
    pub at: DateTime<Utc>,
}

#[derive(Default)]
pub struct SandboxGateway {
    sent: Mutex<Vec<RecordedSms>>,
    /// Scripted failures per phone number, consumed one per send.
    scripted: Mutex<HashMap<String, Vec<GatewayError>>>,
}

impl SandboxGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure for the next send to `phone`. Multiple calls queue
    /// consecutive failures, so a transient-then-success sequence is a
    /// single scripted failure followed by the default success.
    pub fn fail_next(&self, phone: &str, error: GatewayError) {
        self.scripted
            .lock()
            .unwrap()
            .entry(phone.to_string())
            .or_default()
            .push(error);
    }

    /// Every message accepted so far, in send order.
    pub fn sent(&self) -> Vec<RecordedSms> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Phone numbers that received at least one message.
    pub fn notified_phones(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|sms| sms.phone.clone())
            .collect()
    }
}

impl SmsGateway for SandboxGateway {
    fn name(&self) -> &str {
        "sandbox"
    }

    fn send(&self, phone: &str, body: &str) -> Result<(), GatewayError> {
        {
            let mut scripted = self.scripted.lock().unwrap();
            if let Some(queue) = scripted.get_mut(phone) {
                if !queue.is_empty() {
                    return Err(queue.remove(0));
                }
            }
        }
        info!(phone, "sandbox gateway recorded message");
        self.sent.lock().unwrap().push(RecordedSms {
            phone: phone.to_string(),
            body: body.to_string(),
            at: Utc::now(),
        });
        Ok(())
    }
}
