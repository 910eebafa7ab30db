pub mod sandbox;
pub mod twilio;

pub use sandbox::{RecordedSms, SandboxGateway};
pub use twilio::TwilioGateway;

use crate::error::GatewayError;

/// Outbound SMS provider binding.
///
/// Implementations classify every failure as transient (the dispatcher
/// retries with backoff) or permanent (recorded and dropped). The sandbox
/// implementation records instead of sending, behind the same signature, so
/// the dispatcher's retry and aggregation logic is identical in both modes.
pub trait SmsGateway: Send + Sync {
    /// Unique identifier (e.g. "twilio", "sandbox"), used in logs.
    fn name(&self) -> &str;

    /// Deliver one message to one phone number.
    fn send(&self, phone: &str, body: &str) -> Result<(), GatewayError>;
}

/// Thin wrapper around the OS keyring for gateway credential storage.
pub mod keyring_store {
    const SERVICE: &str = "walkguard";

    pub fn get(key: &str) -> Result<Option<String>, Box<dyn std::error::Error>> {
        let entry = keyring::Entry::new(SERVICE, key)?;
        match entry.get_password() {
            Ok(pw) => Ok(Some(pw)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set(key: &str, value: &str) -> Result<(), Box<dyn std::error::Error>> {
        let entry = keyring::Entry::new(SERVICE, key)?;
        entry.set_password(value)?;
        Ok(())
    }

    pub fn delete(key: &str) -> Result<(), Box<dyn std::error::Error>> {
        let entry = keyring::Entry::new(SERVICE, key)?;
        match entry.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
