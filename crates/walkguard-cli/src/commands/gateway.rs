use clap::Subcommand;
use std::sync::Arc;

use walkguard_core::gateway::{keyring_store, twilio::AUTH_TOKEN_KEY};
use walkguard_core::{SandboxGateway, SmsGateway, TwilioGateway};

use super::build;

#[derive(Subcommand)]
pub enum GatewayAction {
    /// Store the provider auth token in the OS keyring
    SetToken { token: String },
    /// Remove the stored auth token
    ClearToken,
    /// Send a test message through the configured gateway
    Test {
        #[arg(long)]
        to: String,
        #[arg(long, default_value = "walkguard gateway test")]
        body: String,
    },
    /// Show which gateway mode is active
    Status,
}

pub async fn run(action: GatewayAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        GatewayAction::SetToken { token } => {
            keyring_store::set(AUTH_TOKEN_KEY, &token)?;
            println!("ok");
        }
        GatewayAction::ClearToken => {
            keyring_store::delete(AUTH_TOKEN_KEY)?;
            println!("ok");
        }
        GatewayAction::Test { to, body } => {
            let app = build()?;
            let gateway: Arc<dyn SmsGateway> = if app.config.gateway.test_mode {
                Arc::new(SandboxGateway::new())
            } else {
                Arc::new(TwilioGateway::from_config(&app.config.gateway)?)
            };
            let name = gateway.name().to_string();
            // Provider sends are blocking; keep them off the async worker.
            tokio::task::spawn_blocking(move || gateway.send(&to, &body)).await??;
            println!("sent via {name}");
        }
        GatewayAction::Status => {
            let app = build()?;
            if app.config.gateway.test_mode {
                println!("sandbox (test_mode = true; sends are recorded, not delivered)");
            } else {
                println!(
                    "twilio (from {})",
                    app.config.gateway.from_number
                );
            }
        }
    }
    Ok(())
}
