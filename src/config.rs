use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::utils;

/// Current configuration version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// Shown in backup filenames
    #[serde(default = "default_app_name")]
    pub app_name: String,
    /// International prefix for reminder links, digits only
    #[serde(default = "default_country_code")]
    pub country_code: String,
    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,
    /// Fee for new clients created without an amount
    #[serde(default = "default_monthly_amount")]
    pub default_monthly_amount: f64,
    /// strftime pattern for calendar dates in backups and listings
    #[serde(default = "default_date_format")]
    pub date_format: String,
    #[serde(default = "default_contact_name")]
    pub contact_name: String,
    #[serde(default = "default_contact_phone")]
    pub contact_phone: String,
    /// Where backups go when no directory is given, current directory if unset
    #[serde(default)]
    pub backup_dir: Option<String>,
    #[serde(default = "default_config_version")]
    pub config_version: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            app_name: default_app_name(),
            country_code: default_country_code(),
            currency_symbol: default_currency_symbol(),
            default_monthly_amount: default_monthly_amount(),
            date_format: default_date_format(),
            contact_name: default_contact_name(),
            contact_phone: default_contact_phone(),
            backup_dir: None,
            config_version: Some(CURRENT_CONFIG_VERSION),
        }
    }
}

// Default value functions
fn default_database_path() -> String {
    // This is a fallback - actual profile will be determined at load time
    if let Some(data_dir) = utils::get_data_dir(utils::Profile::Prod) {
        data_dir.join("ledger.db").to_string_lossy().to_string()
    } else {
        "~/.local/share/lavafix/ledger.db".to_string()
    }
}

fn default_app_name() -> String {
    "LavaFix".to_string()
}

fn default_country_code() -> String {
    "502".to_string()
}

fn default_currency_symbol() -> String {
    "Q".to_string()
}

fn default_monthly_amount() -> f64 {
    150.0
}

fn default_date_format() -> String {
    "%d/%m/%Y".to_string()
}

fn default_contact_name() -> String {
    "Alex Gómez".to_string()
}

fn default_contact_phone() -> String {
    "37080233".to_string()
}

fn default_config_version() -> Option<u32> {
    Some(CURRENT_CONFIG_VERSION)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config directory: {0}")]
    ConfigDirError(String),
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to write config file: {0}")]
    WriteError(String),
}

impl Config {
    /// Load configuration from file, or create default if missing
    /// Uses the provided profile to determine config and database paths
    pub fn load_with_profile(profile: utils::Profile) -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path(profile)?;
        let default_db = Self::default_database_path_for_profile(profile);
        Self::load_from_path(&config_path, &default_db)
    }

    /// Load configuration from an explicit file, creating it with defaults if missing.
    /// A database path missing from the file falls back to `default_db`.
    pub fn load_from_path(config_path: &Path, default_db: &str) -> Result<Self, ConfigError> {
        if config_path.exists() {
            let contents = fs::read_to_string(config_path)
                .map_err(|e| ConfigError::ReadError(e.to_string()))?;
            let mut config: Config = toml::from_str(&contents)?;

            if !Self::declares_database_path(&contents) {
                config.database_path = default_db.to_string();
            }

            Ok(config)
        } else {
            let mut config = Config::default();
            config.database_path = default_db.to_string();
            if let Err(e) = config.save_to_path(config_path) {
                log::error!("Failed to save config file {}: {}", config_path.display(), e);
                return Err(e);
            }
            Ok(config)
        }
    }

    fn declares_database_path(contents: &str) -> bool {
        toml::from_str::<toml::Table>(contents)
            .map(|table| table.contains_key("database_path"))
            .unwrap_or(false)
    }

    /// Save configuration to file
    pub fn save_to_path(&mut self, config_path: &Path) -> Result<(), ConfigError> {
        // Ensure config version is set before saving
        self.config_version = Some(CURRENT_CONFIG_VERSION);

        // Create parent directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteError(e.to_string()))?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::WriteError(format!("Failed to serialize config: {}", e)))?;

        fs::write(config_path, toml_string)
            .map_err(|e| ConfigError::WriteError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the config file
    pub fn get_config_path(profile: utils::Profile) -> Result<PathBuf, ConfigError> {
        let config_dir = utils::get_config_dir(profile)
            .ok_or_else(|| ConfigError::ConfigDirError("Could not determine config directory".to_string()))?;
        Ok(config_dir.join("config.toml"))
    }

    /// Get default database path for a specific profile
    pub fn default_database_path_for_profile(profile: utils::Profile) -> String {
        if let Some(data_dir) = utils::get_data_dir(profile) {
            data_dir.join("ledger.db").to_string_lossy().to_string()
        } else {
            match profile {
                utils::Profile::Dev => "~/.local/share/lavafix-dev/ledger.db".to_string(),
                utils::Profile::Prod => "~/.local/share/lavafix/ledger.db".to_string(),
            }
        }
    }

    /// Get the expanded database path (with ~ expansion)
    pub fn get_database_path(&self) -> PathBuf {
        utils::expand_path(&self.database_path)
    }

    /// Directory for backups, falling back to the working directory
    pub fn get_backup_dir(&self) -> PathBuf {
        match &self.backup_dir {
            Some(dir) if !dir.trim().is_empty() => utils::expand_path(dir),
            _ => PathBuf::from("."),
        }
    }
}
