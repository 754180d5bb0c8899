//! Configuration file support for Calis.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/calis/config.toml`.

use crate::reset::{ResetPolicy, DEFAULT_TRIGGER_HOUR};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub reset: ResetConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
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

/// Daily reset scheduling configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResetConfig {
    /// Local hour (0..=23) at which the recurring check acts and wake-ups land
    #[serde(default = "default_trigger_hour")]
    pub trigger_hour: u32,

    /// Seconds between recurring checks while the process runs
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,

    /// Emit the notification signal after a reset that changed something
    #[serde(default = "default_notify")]
    pub notify: bool,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            trigger_hour: default_trigger_hour(),
            check_interval_secs: default_check_interval_secs(),
            notify: default_notify(),
        }
    }
}

impl ResetConfig {
    pub fn policy(&self) -> Result<ResetPolicy> {
        ResetPolicy::new(self.trigger_hour)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn validate(&self) -> Result<()> {
        self.policy()?;
        if self.check_interval_secs == 0 {
            return Err(Error::Config("check_interval_secs must be positive".into()));
        }
        Ok(())
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("calis")
}

fn default_trigger_hour() -> u32 {
    DEFAULT_TRIGGER_HOUR
}

fn default_check_interval_secs() -> u64 {
    60
}

fn default_notify() -> bool {
    true
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::debug!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("calis").join("config.toml")
    }

    pub fn validate(&self) -> Result<()> {
        self.reset.validate()
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
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
        assert_eq!(config.reset.trigger_hour, 4);
        assert_eq!(config.reset.check_interval(), Duration::from_secs(60));
        assert!(config.reset.notify);
        assert!(config.data.data_dir.ends_with("calis"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");

        let mut config = Config::default();
        config.reset.trigger_hour = 5;
        config.data.data_dir = temp_dir.path().join("data");
        config.save_to(&path).unwrap();

        let parsed = Config::load_from(&path).unwrap();
        assert_eq!(parsed.reset.trigger_hour, 5);
        assert_eq!(parsed.data.data_dir, config.data.data_dir);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[reset]
trigger_hour = 6
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.reset.trigger_hour, 6);
        assert_eq!(config.reset.check_interval_secs, 60); // default
        assert!(config.reset.notify); // default
    }

    #[test]
    fn test_invalid_values_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");

        std::fs::write(&path, "[reset]\ntrigger_hour = 24\n").unwrap();
        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));

        std::fs::write(&path, "[reset]\ncheck_interval_secs = 0\n").unwrap();
        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }
}
