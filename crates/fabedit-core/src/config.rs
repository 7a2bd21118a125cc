//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/fabedit/config.toml)
//! 3. Environment variables (FABEDIT_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::history::DEFAULT_HISTORY_LIMIT;

/// Environment variable prefix
const ENV_PREFIX: &str = "FABEDIT";

const DEFAULT_AUTOSAVE_INTERVAL_SECS: u64 = 30;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Directory for autosave snapshots and settings
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Maximum number of undoable actions kept
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Whether the autosave trigger fires
    #[serde(default = "default_true")]
    pub autosave_enabled: bool,

    /// Seconds between autosaves of a dirty session
    #[serde(default = "default_autosave_interval")]
    pub autosave_interval_secs: u64,

    /// Log level for fabedit crates (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Write logs to this file instead of stderr
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            autosave_enabled: true,
            autosave_interval_secs: DEFAULT_AUTOSAVE_INTERVAL_SECS,
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (FABEDIT_DATA_DIR, FABEDIT_HISTORY_LIMIT, ...)
    /// 2. Config file (~/.config/fabedit/config.toml or FABEDIT_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Values that fail to parse are ignored.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var(format!("{}_HISTORY_LIMIT", ENV_PREFIX)) {
            if let Ok(limit) = val.parse::<usize>() {
                self.history_limit = limit.max(1);
            }
        }

        if let Ok(val) = std::env::var(format!("{}_AUTOSAVE_ENABLED", ENV_PREFIX)) {
            self.autosave_enabled = parse_bool(&val);
        }

        if let Ok(val) = std::env::var(format!("{}_AUTOSAVE_INTERVAL_SECS", ENV_PREFIX)) {
            if let Ok(secs) = val.parse() {
                self.autosave_interval_secs = secs;
            }
        }

        if let Ok(val) = std::env::var(format!("{}_LOG_LEVEL", ENV_PREFIX)) {
            if !val.is_empty() {
                self.log_level = val;
            }
        }

        // Empty string clears it
        if let Ok(val) = std::env::var(format!("{}_LOG_FILE", ENV_PREFIX)) {
            self.log_file = if val.is_empty() {
                None
            } else {
                Some(PathBuf::from(val))
            };
        }
    }

    /// Ensure data directory exists
    pub fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Set a single key from its string form, as `fabedit config set` does
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "data_dir" => self.data_dir = PathBuf::from(value),
            "history_limit" => {
                let limit: usize = value
                    .parse()
                    .with_context(|| format!("Invalid history_limit: {}", value))?;
                if limit == 0 {
                    bail!("history_limit must be at least 1");
                }
                self.history_limit = limit;
            }
            "autosave_enabled" => self.autosave_enabled = parse_bool(value),
            "autosave_interval_secs" => {
                self.autosave_interval_secs = value
                    .parse()
                    .with_context(|| format!("Invalid autosave_interval_secs: {}", value))?;
            }
            "log_level" => self.log_level = value.to_string(),
            "log_file" => {
                self.log_file = (!value.is_empty()).then(|| PathBuf::from(value));
            }
            other => bail!(
                "Unknown config key: {}. Valid keys: data_dir, history_limit, autosave_enabled, autosave_interval_secs, log_level, log_file",
                other
            ),
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with FABEDIT_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fabedit")
            .join("config.toml")
    }

    /// Get the path to the autosave snapshot
    pub fn autosave_path(&self) -> PathBuf {
        self.data_dir.join("autosave.json")
    }

    /// Get the path to the settings file
    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }
}

fn parse_bool(val: &str) -> bool {
    val.eq_ignore_ascii_case("true") || val == "1"
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fabedit")
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

fn default_true() -> bool {
    true
}

fn default_autosave_interval() -> u64 {
    DEFAULT_AUTOSAVE_INTERVAL_SECS
}

fn default_log_level() -> String {
    "warn".to_string()
}
