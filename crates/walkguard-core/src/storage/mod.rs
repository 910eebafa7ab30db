mod config;
pub mod database;
pub mod migrations;

pub use config::{
    AlertConfig, Config, DispatchConfig, GatewayConfig, SessionConfig,
};
pub use database::Database;

use std::path::PathBuf;

/// Returns `~/.config/walkguard[-dev]/` based on WALKGUARD_ENV.
///
/// Set WALKGUARD_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if the home directory cannot be determined or if
/// creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("WALKGUARD_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("walkguard-dev")
    } else {
        base_dir.join("walkguard")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
