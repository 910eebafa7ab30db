use clap::Subcommand;
use walkguard_core::GeoPoint;

use super::{build, print_json};

#[derive(Subcommand)]
pub enum SessionAction {
    /// Start a walk session for a user
    Start {
        #[arg(long)]
        user: i64,
        /// Starting latitude
        #[arg(long, requires = "lng")]
        lat: Option<f64>,
        /// Starting longitude
        #[arg(long, requires = "lat")]
        lng: Option<f64>,
    },
    /// Stop an active walk session
    Stop {
        session_id: i64,
    },
    /// Show a session by id
    Show {
        session_id: i64,
    },
    /// Show the user's active session, if any
    Active {
        #[arg(long)]
        user: i64,
    },
    /// List all sessions for a user
    List {
        #[arg(long)]
        user: i64,
    },
    /// Refresh a session's heartbeat
    Touch {
        session_id: i64,
    },
    /// End active sessions with a stale heartbeat
    Sweep {
        /// Override the configured grace period in seconds
        #[arg(long)]
        grace_seconds: Option<u64>,
    },
}

pub fn run(action: SessionAction) -> Result<(), Box<dyn std::error::Error>> {
    let app = build()?;
    match action {
        SessionAction::Start { user, lat, lng } => {
            let location = match (lat, lng) {
                (Some(lat), Some(lng)) => Some(GeoPoint {
                    lat,
                    lng,
                    accuracy_m: None,
                }),
                _ => None,
            };
            let session = app.sessions.start_session(user, location)?;
            print_json(&session)?;
        }
        SessionAction::Stop { session_id } => {
            let session = app.sessions.stop_session(session_id)?;
            print_json(&session)?;
        }
        SessionAction::Show { session_id } => {
            let session = app.sessions.get_session(session_id)?;
            print_json(&session)?;
        }
        SessionAction::Active { user } => match app.sessions.active_session(user)? {
            Some(session) => print_json(&session)?,
            None => println!("no active session for user {user}"),
        },
        SessionAction::List { user } => {
            let sessions = app.sessions.sessions_for_user(user)?;
            print_json(&sessions)?;
        }
        SessionAction::Touch { session_id } => {
            app.sessions.touch(session_id)?;
            println!("ok");
        }
        SessionAction::Sweep { grace_seconds } => {
            let grace = grace_seconds
                .map(std::time::Duration::from_secs)
                .unwrap_or_else(|| app.config.idle_grace());
            let ended = app.sessions.end_idle_sessions(grace)?;
            println!("ended {} idle session(s)", ended.len());
            if !ended.is_empty() {
                print_json(&ended)?;
            }
        }
    }
    Ok(())
}
