use clap::Subcommand;
use std::sync::Arc;

use walkguard_core::{AlertCandidate, AlertKind, GeoPoint, SignalIntake};

use super::{build, print_json};

#[derive(Subcommand)]
pub enum AlertAction {
    /// Submit an alert candidate (what a detection producer would send)
    Submit {
        #[arg(long)]
        user: i64,
        /// Walk session the alert belongs to
        #[arg(long)]
        session: Option<i64>,
        /// scream | fall | distress | panic | motion-anomaly | sound-anomaly
        /// | voice-activation | sos
        #[arg(long)]
        kind: String,
        /// Producer confidence in [0.0, 1.0]
        #[arg(long)]
        confidence: f64,
        #[arg(long, requires = "lng")]
        lat: Option<f64>,
        #[arg(long, requires = "lat")]
        lng: Option<f64>,
        /// Location accuracy in meters
        #[arg(long)]
        accuracy: Option<f64>,
        #[arg(long)]
        snapshot_url: Option<String>,
        /// Trigger immediately, skipping the countdown
        #[arg(long)]
        instant: bool,
        /// Stay alive until the countdown resolves. Without this, a pending
        /// countdown is left to `dispatch recover` if the process exits.
        #[arg(long)]
        wait: bool,
    },
    /// Cancel a pending alert before its countdown elapses
    Cancel {
        alert_id: i64,
    },
    /// Mark a triggered alert as resolved safe
    Safe {
        alert_id: i64,
    },
    /// Show an alert by id
    Show {
        alert_id: i64,
    },
    /// List a user's alerts, newest first
    List {
        #[arg(long)]
        user: i64,
        #[arg(long, default_value = "50")]
        limit: u32,
    },
    /// List alerts for a walk session
    Session {
        session_id: i64,
    },
    /// Show an alert's event history and notification attempts
    History {
        alert_id: i64,
    },
}

pub async fn run(action: AlertAction) -> Result<(), Box<dyn std::error::Error>> {
    let app = build()?;
    match action {
        AlertAction::Submit {
            user,
            session,
            kind,
            confidence,
            lat,
            lng,
            accuracy,
            snapshot_url,
            instant,
            wait,
        } => {
            let kind: AlertKind = kind.parse()?;
            let location = match (lat, lng) {
                (Some(lat), Some(lng)) => Some(GeoPoint {
                    lat,
                    lng,
                    accuracy_m: accuracy,
                }),
                _ => None,
            };
            let intake = SignalIntake::new(
                Arc::clone(&app.engine),
                app.config.alert.confidence_threshold,
            );
            let alert = intake
                .submit(AlertCandidate {
                    user_id: user,
                    session_id: session,
                    kind,
                    confidence,
                    location,
                    snapshot_url,
                    instant,
                })
                .await?;
            let alert = if wait && !instant {
                app.engine.wait_until_resolved(alert.id).await?
            } else {
                alert
            };
            print_json(&alert)?;
        }
        AlertAction::Cancel { alert_id } => {
            let alert = app.engine.cancel(alert_id)?;
            println!("alert {alert_id} cancelled");
            print_json(&alert)?;
        }
        AlertAction::Safe { alert_id } => {
            let alert = app.engine.mark_safe(alert_id)?;
            print_json(&alert)?;
        }
        AlertAction::Show { alert_id } => {
            let alert = app.engine.get_alert(alert_id)?;
            print_json(&alert)?;
        }
        AlertAction::List { user, limit } => {
            let alerts = {
                let db = app.db.lock().unwrap();
                db.alerts_for_user(user, limit)?
            };
            print_json(&alerts)?;
        }
        AlertAction::Session { session_id } => {
            let alerts = {
                let db = app.db.lock().unwrap();
                db.alerts_for_session(session_id)?
            };
            print_json(&alerts)?;
        }
        AlertAction::History { alert_id } => {
            // Ensure a clean not-found error for unknown ids.
            let alert = app.engine.get_alert(alert_id)?;
            let (events, attempts) = {
                let db = app.db.lock().unwrap();
                (
                    db.events_for_alert(alert_id)?,
                    db.attempts_for_alert(alert_id)?,
                )
            };
            print_json(&serde_json::json!({
                "alert": alert,
                "events": events,
                "attempts": attempts,
            }))?;
        }
    }
    Ok(())
}
