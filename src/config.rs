//! Configuration file and default locations
//!
//! Settings come from an optional JSON file; command line flags override
//! them. When no file is named, `~/.habitflow/config.json` is used if it
//! exists. The backend is chosen once from this configuration and never
//! switched while running.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::i18n::Lang;
use crate::reminder::NotificationPermission;
use crate::session::DEFAULT_PASSCODE;

/// Application namespace used when none is configured
pub const DEFAULT_APP_ID: &str = "habitflow-default";

/// User id used when none is configured
pub const DEFAULT_USER: &str = "local-user";

const CONFIG_FILE: &str = "config.json";
const DATABASE_FILE: &str = "habits.db";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Which record store to use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    /// SQLite mirror; `None` picks the default location
    Local { path: Option<PathBuf> },
    /// Document server at `addr` (host:port)
    Remote { addr: String },
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Local { path: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub backend: BackendConfig,
    pub app_id: String,
    pub passcode: String,
    pub language: Lang,
    pub user: String,
    pub reminder_period_secs: u64,
    pub notifications: NotificationPermission,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            app_id: DEFAULT_APP_ID.to_string(),
            passcode: DEFAULT_PASSCODE.to_string(),
            language: Lang::default(),
            user: DEFAULT_USER.to_string(),
            reminder_period_secs: 60,
            notifications: NotificationPermission::default(),
        }
    }
}

impl Config {
    /// Read and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `explicit` if given, else the default file if present, else defaults
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        match dirs::home_dir().map(|home| home.join(".habitflow").join(CONFIG_FILE)) {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app_id.trim().is_empty() {
            return Err(ConfigError::Invalid("appId cannot be empty".to_string()));
        }
        if self.user.trim().is_empty() {
            return Err(ConfigError::Invalid("user cannot be empty".to_string()));
        }
        if self.reminder_period_secs == 0 {
            return Err(ConfigError::Invalid(
                "reminderPeriodSecs must be at least 1".to_string(),
            ));
        }
        if let BackendConfig::Remote { addr } = &self.backend {
            if addr.trim().is_empty() {
                return Err(ConfigError::Invalid("remote backend needs an addr".to_string()));
            }
        }
        Ok(())
    }

    pub fn reminder_period(&self) -> Duration {
        Duration::from_secs(self.reminder_period_secs)
    }
}

/// Get the default data directory with robust fallback strategy
pub fn default_data_dir() -> Result<PathBuf, ConfigError> {
    // Try various locations in order of preference
    let candidates = [
        // 1. User's home directory (preferred)
        dirs::home_dir().map(|p| p.join(".habitflow")),
        // 2. User's data directory (platform-specific)
        dirs::data_dir().map(|p| p.join("habitflow")),
        // 3. User's config directory
        dirs::config_dir().map(|p| p.join("habitflow")),
        // 4. Current working directory (last resort)
        std::env::current_dir().ok().map(|p| p.join(".habitflow")),
    ];

    for candidate in candidates.iter().flatten() {
        if fs::create_dir_all(candidate).is_ok() {
            let probe = candidate.join(".test_write");
            if fs::write(&probe, "test").is_ok() {
                let _ = fs::remove_file(&probe);
                return Ok(candidate.clone());
            }
        }
    }

    // Ultimate fallback: use a temporary directory
    let temp = std::env::temp_dir().join("habitflow");
    fs::create_dir_all(&temp).map_err(|source| ConfigError::Io {
        path: temp.clone(),
        source,
    })?;

    tracing::warn!("Using temporary directory for data: {}", temp.display());
    Ok(temp)
}

/// Where the local mirror lives when no path is configured
pub fn default_database_path() -> Result<PathBuf, ConfigError> {
    Ok(default_data_dir()?.join(DATABASE_FILE))
}
