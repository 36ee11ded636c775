//! Configuration file support for Almanac.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/almanac/config.toml`.

use crate::agenda::DEFAULT_RECENT_NAMES_LIMIT;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub agenda: AgendaConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Defaults for newly created events
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ScheduleConfig {
    /// Length of the default time slot; new events start on the next slot
    /// boundary and last one slot
    #[serde(default = "default_slot_minutes")]
    pub slot_minutes: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            slot_minutes: default_slot_minutes(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AgendaConfig {
    #[serde(default = "default_recent_names_limit")]
    pub recent_names_limit: usize,
}

impl Default for AgendaConfig {
    fn default() -> Self {
        Self {
            recent_names_limit: default_recent_names_limit(),
        }
    }
}

// Default value functions
fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| home_dir().join(".local/share"));
    base.join("almanac")
}

fn default_slot_minutes() -> u32 {
    30
}

fn default_recent_names_limit() -> usize {
    DEFAULT_RECENT_NAMES_LIMIT
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::debug!("No config file found at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Reject values no command can work with
    pub fn validate(&self) -> Result<()> {
        let slot = self.schedule.slot_minutes;
        if slot == 0 || slot > 24 * 60 {
            return Err(Error::Config(format!(
                "schedule.slot_minutes must be between 1 and 1440, got {}",
                slot
            )));
        }
        if self.data.data_dir.as_os_str().is_empty() {
            return Err(Error::Config("data.data_dir must not be empty".into()));
        }
        Ok(())
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| home_dir().join(".config"));
        base.join("almanac").join("config.toml")
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.schedule.slot_minutes, 30);
        assert_eq!(config.agenda.recent_names_limit, 20);
        assert!(config.data.data_dir.ends_with("almanac"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.data.data_dir = temp_dir.path().join("data");
        config.schedule.slot_minutes = 15;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[schedule]
slot_minutes = 60
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.schedule.slot_minutes, 60);
        assert_eq!(config.agenda.recent_names_limit, 20); // default
    }

    #[test]
    fn test_invalid_slot_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[schedule]\nslot_minutes = 0\n").unwrap();

        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_malformed_toml_is_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[schedule\n").unwrap();

        assert!(matches!(Config::load_from(&path), Err(Error::Toml(_))));
    }
}
