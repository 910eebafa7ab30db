//! Twilio SMS binding.
//!
//! Uses the blocking reqwest client: sends run on the tokio blocking pool,
//! one per contact, with the per-send timeout configured here rather than on
//! the alert countdown.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;

use crate::error::GatewayError;
use crate::storage::GatewayConfig;

use super::{keyring_store, SmsGateway};

const DEFAULT_BASE_URL: &str = "https://api.twilio.com";

/// Keyring key holding the Twilio auth token.
pub const AUTH_TOKEN_KEY: &str = "twilio_auth_token";

pub struct TwilioGateway {
    http: Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl TwilioGateway {
    /// Build a gateway from config, reading the auth token from the OS
    /// keyring.
    pub fn from_config(cfg: &GatewayConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let token = keyring_store::get(AUTH_TOKEN_KEY)?
            .ok_or("no Twilio auth token stored; run `walkguard-cli gateway set-token` first")?;
        if cfg.account_sid.is_empty() || cfg.from_number.is_empty() {
            return Err("gateway.account_sid and gateway.from_number must be configured".into());
        }
        Ok(Self::new(
            &cfg.account_sid,
            &token,
            &cfg.from_number,
            DEFAULT_BASE_URL,
            Duration::from_secs(cfg.send_timeout_seconds),
        ))
    }

    /// Build a gateway against an explicit endpoint (tests point this at a
    /// mock server).
    pub fn new(
        account_sid: &str,
        auth_token: &str,
        from_number: &str,
        base_url: &str,
        timeout: Duration,
    ) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            account_sid: account_sid.to_string(),
            auth_token: auth_token.to_string(),
            from_number: from_number.to_string(),
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        )
    }

    fn classify_status(status: StatusCode, body: &str) -> GatewayError {
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            GatewayError::transient(format!("HTTP {status}: {body}"))
        } else {
            GatewayError::permanent(format!("HTTP {status}: {body}"))
        }
    }
}

impl SmsGateway for TwilioGateway {
    fn name(&self) -> &str {
        "twilio"
    }

    fn send(&self, phone: &str, body: &str) -> Result<(), GatewayError> {
        let resp = self
            .http
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", phone), ("From", &self.from_number), ("Body", body)])
            .send()
            .map_err(|e| {
                // Connect errors and timeouts are retryable.
                GatewayError::transient(format!("request failed: {e}"))
            })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let text = resp.text().unwrap_or_default();
        Err(Self::classify_status(status, &text))
    }
}
