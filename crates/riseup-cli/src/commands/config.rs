use clap::Subcommand;
use riseup_core::{Config, ConfigError};

use super::print_json;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print one value by dot-path key (e.g. "ringing.step_goal")
    Get { key: String },
    /// Change one value; it is validated before being written
    Set { key: String, value: String },
    /// Print the whole config as JSON
    List,
    /// Overwrite the config file with defaults
    Reset,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Get { key } => {
            let value = Config::load()?
                .get(&key)
                .ok_or(ConfigError::UnknownKey(key))?;
            println!("{value}");
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            println!("{key} = {}", config.get(&key).unwrap_or(value));
        }
        ConfigAction::List => print_json(&Config::load()?)?,
        ConfigAction::Reset => {
            Config::default().save()?;
            println!("config reset to defaults");
        }
    }
    Ok(())
}
