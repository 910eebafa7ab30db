//! Alert domain types and the lifecycle engine.
//!
//! ## State Transitions
//!
//! ```text
//! pending -> (triggered | cancelled)
//! triggered -> safe
//! ```
//!
//! `cancelled` and `safe` are terminal. `pending` is the only state with a
//! live countdown timer.

mod engine;

pub use engine::{AlertEngine, RecoverySummary};

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Signal origin of a distress alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertKind {
    Scream,
    Fall,
    Distress,
    Panic,
    MotionAnomaly,
    SoundAnomaly,
    VoiceActivation,
    Sos,
}

impl AlertKind {
    /// Stable string form used in the database and the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Scream => "scream",
            AlertKind::Fall => "fall",
            AlertKind::Distress => "distress",
            AlertKind::Panic => "panic",
            AlertKind::MotionAnomaly => "motion-anomaly",
            AlertKind::SoundAnomaly => "sound-anomaly",
            AlertKind::VoiceActivation => "voice-activation",
            AlertKind::Sos => "sos",
        }
    }

    /// Human-readable label used in notification messages.
    pub fn label(&self) -> &'static str {
        match self {
            AlertKind::Scream => "Scream detected",
            AlertKind::Fall => "Fall detected",
            AlertKind::Distress => "Distress call",
            AlertKind::Panic => "Panic signal",
            AlertKind::MotionAnomaly => "Unusual movement",
            AlertKind::SoundAnomaly => "Unusual sound",
            AlertKind::VoiceActivation => "Voice-activated emergency",
            AlertKind::Sos => "SOS",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scream" => Ok(AlertKind::Scream),
            "fall" => Ok(AlertKind::Fall),
            "distress" => Ok(AlertKind::Distress),
            "panic" => Ok(AlertKind::Panic),
            "motion-anomaly" => Ok(AlertKind::MotionAnomaly),
            "sound-anomaly" => Ok(AlertKind::SoundAnomaly),
            "voice-activation" => Ok(AlertKind::VoiceActivation),
            "sos" => Ok(AlertKind::Sos),
            other => Err(format!("unknown alert kind: {other}")),
        }
    }
}

/// Alert lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Pending,
    Triggered,
    Cancelled,
    Safe,
}

impl AlertStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AlertStatus::Cancelled | AlertStatus::Safe)
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertStatus::Pending => "pending",
            AlertStatus::Triggered => "triggered",
            AlertStatus::Cancelled => "cancelled",
            AlertStatus::Safe => "safe",
        };
        f.write_str(s)
    }
}

/// A geographic fix attached to a session or an alert.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
    /// Horizontal accuracy in meters, when the source reports one.
    pub accuracy_m: Option<f64>,
}

impl GeoPoint {
    /// Shareable map link for notification messages.
    pub fn maps_link(&self) -> String {
        format!("https://www.google.com/maps?q={},{}", self.lat, self.lng)
    }
}

/// A distress alert record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub user_id: i64,
    pub session_id: Option<i64>,
    pub kind: AlertKind,
    /// Producer-reported confidence in [0.0, 1.0].
    pub confidence: f64,
    pub status: AlertStatus,
    pub location: Option<GeoPoint>,
    pub snapshot_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub triggered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}
