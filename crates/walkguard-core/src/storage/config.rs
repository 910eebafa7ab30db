//! TOML-based application configuration.
//!
//! Stores engine tuning:
//! - Countdown delay and confidence threshold
//! - Dispatch retry policy
//! - Session idle grace period
//! - Gateway provider settings and test mode
//!
//! Configuration is stored at `~/.config/walkguard/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::data_dir;

/// Alert countdown configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Seconds a pending alert waits before triggering.
    #[serde(default = "default_countdown_seconds")]
    pub countdown_seconds: u64,
    /// Minimum producer confidence for a countdown candidate to be accepted.
    /// Instant candidates bypass this.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

/// Notification dispatch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Additional attempts after the first failed transient send.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff between retries; doubles per attempt, plus jitter.
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
}

/// Walk session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Active sessions with no heartbeat for this long are ended by the
    /// sweep.
    #[serde(default = "default_idle_grace_seconds")]
    pub idle_grace_seconds: u64,
}

/// Messaging gateway configuration. The auth token lives in the OS keyring,
/// not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// When true, sends are recorded by the sandbox instead of hitting the
    /// provider.
    #[serde(default = "default_true")]
    pub test_mode: bool,
    #[serde(default)]
    pub account_sid: String,
    #[serde(default)]
    pub from_number: String,
    /// Per-send network timeout, independent of the alert countdown.
    #[serde(default = "default_send_timeout_seconds")]
    pub send_timeout_seconds: u64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/walkguard/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub alert: AlertConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

// Default functions
fn default_countdown_seconds() -> u64 {
    5
}
fn default_confidence_threshold() -> f64 {
    0.8
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_base_ms() -> u64 {
    500
}
fn default_idle_grace_seconds() -> u64 {
    900
}
fn default_send_timeout_seconds() -> u64 {
    10
}
fn default_true() -> bool {
    true
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            countdown_seconds: default_countdown_seconds(),
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_grace_seconds: default_idle_grace_seconds(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            test_mode: true,
            account_sid: String::new(),
            from_number: String::new(),
            send_timeout_seconds: default_send_timeout_seconds(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            alert: AlertConfig::default(),
            dispatch: DispatchConfig::default(),
            session: SessionConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

impl Config {
    fn path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or write and return the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content)?;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(Self::path()?, content)?;
        Ok(())
    }

    pub fn countdown(&self) -> Duration {
        Duration::from_secs(self.alert.countdown_seconds)
    }

    pub fn idle_grace(&self) -> Duration {
        Duration::from_secs(self.session.idle_grace_seconds)
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let mut current = &json;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(match current {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Set a config value by dot-separated key, parsing the string against
    /// the existing value's type.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), Box<dyn std::error::Error>> {
        let mut json = serde_json::to_value(&*self)?;
        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() {
            return Err("config key is empty".into());
        }

        let mut current = &mut json;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| format!("unknown config key: {key}"))?;
                let existing = obj
                    .get(part)
                    .ok_or_else(|| format!("unknown config key: {key}"))?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(value.parse::<bool>()?),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| format!("cannot parse '{value}' as number"))?
                        } else {
                            return Err(format!("cannot parse '{value}' as number").into());
                        }
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                *self = serde_json::from_value(json)?;
                return Ok(());
            }

            current = current
                .get_mut(part)
                .ok_or_else(|| format!("unknown config key: {key}"))?;
        }

        Err(format!("unknown config key: {key}").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.alert.countdown_seconds, 5);
        assert_eq!(cfg.alert.confidence_threshold, 0.8);
        assert_eq!(cfg.dispatch.max_retries, 2);
        assert!(cfg.gateway.test_mode);
    }

    #[test]
    fn toml_round_trip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.alert.countdown_seconds, cfg.alert.countdown_seconds);
        assert_eq!(parsed.gateway.test_mode, cfg.gateway.test_mode);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let cfg: Config = toml::from_str("[alert]\ncountdown_seconds = 30\n").unwrap();
        assert_eq!(cfg.alert.countdown_seconds, 30);
        assert_eq!(cfg.alert.confidence_threshold, 0.8);
        assert_eq!(cfg.dispatch.max_retries, 2);
    }

    #[test]
    fn get_and_set_by_dot_path() {
        let mut cfg = Config::default();
        assert_eq!(cfg.get("alert.countdown_seconds").as_deref(), Some("5"));
        cfg.set("alert.countdown_seconds", "10").unwrap();
        assert_eq!(cfg.alert.countdown_seconds, 10);
        cfg.set("gateway.test_mode", "false").unwrap();
        assert!(!cfg.gateway.test_mode);
        assert!(cfg.set("alert.nope", "1").is_err());
        assert!(cfg.set("alert.countdown_seconds", "abc").is_err());
    }
}
