//! TOML-based application configuration.
//!
//! Stores tunables for:
//! - Foreground ringing (step goal, burst count and spacing, pattern)
//! - The background smart alarm session (horizon, notification cadence)
//! - The simulated platform used by the CLI
//! - Log level
//!
//! Configuration is stored at `<data_dir>/config.toml`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::{ConfigError, Result};
use crate::haptics::HapticPattern;
use crate::runner::RingConfig;
use crate::session::{SessionConfig, MAX_SESSION_HORIZON_HOURS};

/// Foreground ringing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingingConfig {
    #[serde(default = "default_step_goal")]
    pub step_goal: u32,
    #[serde(default = "default_max_bursts")]
    pub max_bursts: u32,
    #[serde(default = "default_burst_interval_ms")]
    pub burst_interval_ms: u64,
    #[serde(default)]
    pub pattern: HapticPattern,
}

/// Background smart alarm configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmartAlarmConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Can lower the platform horizon, never raise it.
    #[serde(default = "default_max_horizon_hours")]
    pub max_horizon_hours: u32,
    #[serde(default = "default_notify_interval_ms")]
    pub notify_interval_ms: u64,
}

/// Simulated platform configuration (used by `riseup run`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_steps_per_second")]
    pub steps_per_second: u32,
    #[serde(default = "default_session_max_runtime_secs")]
    pub session_max_runtime_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data_dir>/config.toml`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ringing: RingingConfig,
    #[serde(default)]
    pub smart_alarm: SmartAlarmConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_step_goal() -> u32 {
    20
}
fn default_max_bursts() -> u32 {
    60
}
fn default_burst_interval_ms() -> u64 {
    1500
}
fn default_true() -> bool {
    true
}
fn default_max_horizon_hours() -> u32 {
    MAX_SESSION_HORIZON_HOURS
}
fn default_notify_interval_ms() -> u64 {
    2000
}
fn default_steps_per_second() -> u32 {
    2
}
fn default_session_max_runtime_secs() -> u64 {
    30 * 60
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for RingingConfig {
    fn default() -> Self {
        Self {
            step_goal: default_step_goal(),
            max_bursts: default_max_bursts(),
            burst_interval_ms: default_burst_interval_ms(),
            pattern: HapticPattern::default(),
        }
    }
}

impl Default for SmartAlarmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_horizon_hours: default_max_horizon_hours(),
            notify_interval_ms: default_notify_interval_ms(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            steps_per_second: default_steps_per_second(),
            session_max_runtime_secs: default_session_max_runtime_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as bool")))?,
                    ),
                    serde_json::Value::Number(_) => value
                        .parse::<u64>()
                        .map(|n| serde_json::Value::Number(n.into()))
                        .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?,
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    fn path() -> Result<PathBuf> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk, writing defaults when no file exists yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed
    /// or fails validation, or if the default config cannot be written.
    pub fn load() -> Result<Self> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
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
    pub fn save(&self) -> Result<()> {
        let path = Self::path()?;
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!("Falling back to default config: {e}");
            Self::default()
        })
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key, validate, and save.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed
    /// or is out of range, or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.apply(key, value)?;
        self.save()
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        let mut json = serde_json::to_value(&*self)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Reject values the runner or coordinator cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |key: &str, v: u64| {
            if v == 0 {
                Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "must be greater than zero".into(),
                })
            } else {
                Ok(())
            }
        };
        positive("ringing.step_goal", self.ringing.step_goal.into())?;
        positive("ringing.max_bursts", self.ringing.max_bursts.into())?;
        positive("ringing.burst_interval_ms", self.ringing.burst_interval_ms)?;
        positive("smart_alarm.max_horizon_hours", self.smart_alarm.max_horizon_hours.into())?;
        positive("smart_alarm.notify_interval_ms", self.smart_alarm.notify_interval_ms)?;

        if self.smart_alarm.max_horizon_hours > MAX_SESSION_HORIZON_HOURS {
            return Err(ConfigError::InvalidValue {
                key: "smart_alarm.max_horizon_hours".into(),
                message: format!("platform limit is {MAX_SESSION_HORIZON_HOURS} hours"),
            });
        }
        Ok(())
    }

    pub fn ring_config(&self) -> RingConfig {
        RingConfig {
            step_goal: self.ringing.step_goal,
            max_bursts: self.ringing.max_bursts,
            burst_interval: Duration::from_millis(self.ringing.burst_interval_ms),
            pattern: self.ringing.pattern,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            enabled: self.smart_alarm.enabled,
            horizon: chrono::Duration::hours(self.smart_alarm.max_horizon_hours.into()),
            notify_interval: Duration::from_millis(self.smart_alarm.notify_interval_ms),
        }
    }
}
