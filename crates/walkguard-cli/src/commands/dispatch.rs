use clap::Subcommand;

use super::{build, print_json};

#[derive(Subcommand)]
pub enum DispatchAction {
    /// Run the restart recovery sweep: fire overdue countdowns, re-arm the
    /// rest, resume incomplete fan-outs
    Recover,
    /// Show the notification attempts recorded for an alert
    Attempts { alert_id: i64 },
}

pub async fn run(action: DispatchAction) -> Result<(), Box<dyn std::error::Error>> {
    let app = build()?;
    match action {
        DispatchAction::Recover => {
            let summary = app.engine.recover().await?;
            // Re-armed countdowns live in this process; ride them out before
            // exiting so they are not orphaned again.
            if summary.rearmed > 0 {
                let pending: Vec<i64> = app.engine.armed_countdowns();
                for alert_id in pending {
                    let _ = app.engine.wait_until_resolved(alert_id).await;
                }
            }
            print_json(&summary)?;
        }
        DispatchAction::Attempts { alert_id } => {
            let attempts = {
                let db = app.db.lock().unwrap();
                db.attempts_for_alert(alert_id)?
            };
            print_json(&attempts)?;
        }
    }
    Ok(())
}
