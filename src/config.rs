//! Deployment Settings
//!
//! Settings are resolved in three layers, later layers winning:
//! 1. Built-in defaults
//! 2. An optional YAML settings file
//! 3. `LOADFLOW_*` environment variables
//!
//! The CLI applies its own flags on top of the result.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Concurrency cap of a parallel stage.
pub const DEFAULT_CONCURRENCY_CAP: usize = 40;

/// Ceiling on how long a single job may take to report back (1440 minutes).
pub const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 1440 * 60;

const ENV_PREFIX: &str = "LOADFLOW_";

/// Orchestrator deployment settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Maximum jobs in flight within a parallel stage
    pub concurrency_cap: usize,

    /// How long to wait for each job's callback
    pub callback_timeout_secs: u64,

    /// Directory holding the scripts the shell executor runs
    pub scripts_dir: PathBuf,

    /// Directory receiving per-job result logs
    pub log_dir: PathBuf,

    /// Directory of the JSON file audit store
    pub audit_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            concurrency_cap: DEFAULT_CONCURRENCY_CAP,
            callback_timeout_secs: DEFAULT_CALLBACK_TIMEOUT_SECS,
            scripts_dir: PathBuf::from("scripts"),
            log_dir: PathBuf::from("logs"),
            audit_dir: PathBuf::from(".loadflow/audit"),
        }
    }
}

impl Settings {
    /// Loads settings from an optional file plus the process environment.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        let env: HashMap<String, String> = std::env::vars()
            .filter(|(key, _)| key.starts_with(ENV_PREFIX))
            .collect();
        settings.apply_env(&env)?;
        settings.validate()?;

        info!(
            "Settings: concurrency cap {}, callback timeout {}s",
            settings.concurrency_cap, settings.callback_timeout_secs
        );
        Ok(settings)
    }

    /// Reads a YAML settings file; missing keys keep their defaults.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    /// Applies `LOADFLOW_*` overrides from the given variables.
    pub fn apply_env(&mut self, env: &HashMap<String, String>) -> Result<(), ConfigError> {
        for (key, value) in env {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };

            match name {
                "CONCURRENCY_CAP" => self.concurrency_cap = parse_number(key, value)?,
                "CALLBACK_TIMEOUT_SECS" => self.callback_timeout_secs = parse_number(key, value)?,
                "SCRIPTS_DIR" => self.scripts_dir = PathBuf::from(value),
                "LOG_DIR" => self.log_dir = PathBuf::from(value),
                "AUDIT_DIR" => self.audit_dir = PathBuf::from(value),
                _ => {
                    debug!("Ignoring unknown setting {}", key);
                    continue;
                }
            }
            debug!("Setting override from {}", key);
        }
        Ok(())
    }

    /// Rejects settings the orchestrator cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency_cap == 0 {
            return Err(ConfigError::InvalidSetting {
                key: "concurrency_cap".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.callback_timeout_secs == 0 {
            return Err(ConfigError::InvalidSetting {
                key: "callback_timeout_secs".to_string(),
                reason: "must be at least 1 second".to_string(),
            });
        }
        Ok(())
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidSetting {
        key: key.to_string(),
        reason: format!("'{}' is not a valid number", value),
    })
}
