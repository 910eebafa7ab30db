//! Signal intake: the boundary detection producers call.
//!
//! Producers (keyword spotters, audio classifiers, motion heuristics) are
//! out of scope; anything that can emit a typed, confidence-scored
//! candidate is substitutable. The intake validates the candidate, applies
//! the confidence-threshold policy, and routes it to the engine.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::alert::{Alert, AlertEngine, AlertKind, GeoPoint};
use crate::error::Result;
use crate::storage::database::NewAlert;
use crate::CoreError;

/// An alert candidate submitted by a detection producer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertCandidate {
    pub user_id: i64,
    pub session_id: Option<i64>,
    pub kind: AlertKind,
    pub confidence: f64,
    pub location: Option<GeoPoint>,
    pub snapshot_url: Option<String>,
    /// Bypass the countdown (SOS button, voice-activation keyword).
    pub instant: bool,
}

/// Producer-facing submission boundary.
pub struct SignalIntake {
    engine: Arc<AlertEngine>,
    /// Countdown candidates below this confidence are rejected outright.
    /// Instant candidates bypass the threshold.
    confidence_threshold: f64,
}

impl SignalIntake {
    pub fn new(engine: Arc<AlertEngine>, confidence_threshold: f64) -> Self {
        Self {
            engine,
            confidence_threshold,
        }
    }

    /// Validate and submit a candidate.
    pub async fn submit(&self, candidate: AlertCandidate) -> Result<Alert> {
        if !(0.0..=1.0).contains(&candidate.confidence) {
            return Err(CoreError::Validation(format!(
                "confidence {} is outside [0.0, 1.0]",
                candidate.confidence
            )));
        }
        if let Some(location) = candidate.location {
            if !(-90.0..=90.0).contains(&location.lat)
                || !(-180.0..=180.0).contains(&location.lng)
            {
                return Err(CoreError::Validation(format!(
                    "location ({}, {}) is not a valid coordinate",
                    location.lat, location.lng
                )));
            }
        }
        if !candidate.instant && candidate.confidence < self.confidence_threshold {
            return Err(CoreError::Validation(format!(
                "confidence {} is below the alert threshold {}",
                candidate.confidence, self.confidence_threshold
            )));
        }

        let new = NewAlert {
            user_id: candidate.user_id,
            session_id: candidate.session_id,
            kind: candidate.kind,
            confidence: candidate.confidence,
            location: candidate.location,
            snapshot_url: candidate.snapshot_url,
        };
        self.engine.submit(new, candidate.instant).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertStatus;
    use crate::contacts::StaticContactDirectory;
    use crate::dispatch::{Dispatcher, RetryPolicy};
    use crate::gateway::SandboxGateway;
    use crate::storage::Database;
    use std::sync::Mutex;
    use std::time::Duration;

    fn intake() -> SignalIntake {
        let db = Arc::new(Mutex::new(Database::open_memory().unwrap()));
        let dispatcher = Dispatcher::new(
            Arc::clone(&db),
            Arc::new(StaticContactDirectory::new(1, &["+15550001"])),
            Arc::new(SandboxGateway::new()),
            RetryPolicy::default(),
        );
        let engine = Arc::new(AlertEngine::new(db, dispatcher, Duration::from_secs(60)));
        SignalIntake::new(engine, 0.8)
    }

    fn candidate(confidence: f64, instant: bool) -> AlertCandidate {
        AlertCandidate {
            user_id: 1,
            session_id: None,
            kind: AlertKind::SoundAnomaly,
            confidence,
            location: None,
            snapshot_url: None,
            instant,
        }
    }

    #[tokio::test]
    async fn below_threshold_countdown_candidate_is_rejected() {
        let intake = intake();
        let err = intake.submit(candidate(0.5, false)).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn instant_candidate_bypasses_threshold() {
        let intake = intake();
        let alert = intake.submit(candidate(0.1, true)).await.unwrap();
        assert_eq!(alert.status, AlertStatus::Triggered);
    }

    #[tokio::test]
    async fn out_of_range_confidence_is_rejected() {
        let intake = intake();
        assert!(intake.submit(candidate(1.5, true)).await.is_err());
        assert!(intake.submit(candidate(-0.1, false)).await.is_err());
    }

    #[tokio::test]
    async fn bad_coordinates_are_rejected() {
        let intake = intake();
        let mut cand = candidate(0.9, false);
        cand.location = Some(GeoPoint {
            lat: 123.0,
            lng: 0.0,
            accuracy_m: None,
        });
        assert!(intake.submit(cand).await.is_err());
    }

    #[tokio::test]
    async fn accepted_candidate_becomes_pending_alert() {
        let intake = intake();
        let alert = intake.submit(candidate(0.9, false)).await.unwrap();
        assert_eq!(alert.status, AlertStatus::Pending);
        assert_eq!(alert.kind, AlertKind::SoundAnomaly);
    }
}
