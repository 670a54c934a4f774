mod config;
pub mod database;

pub use config::{Config, LoggingConfig, RingingConfig, SimulationConfig, SmartAlarmConfig};
pub use database::Database;

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the data directory, creating it if needed.
///
/// `RISEUP_DATA_DIR` wins when set. Otherwise `~/.config/riseup[-dev]/`
/// based on `RISEUP_ENV` (set `RISEUP_ENV=dev` for the development
/// directory).
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("RISEUP_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("RISEUP_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("riseup-dev")
            } else {
                base_dir.join("riseup")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
