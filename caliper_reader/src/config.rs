/*!
Configuration management for the caliper reader.
*/

use anyhow::{Context, Result};
use caliper_decoder::protocol::ProtocolConfig;
use caliper_decoder::{PinConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub pins: PinConfig,
    pub protocol: ProtocolConfig,
    pub reader: RetryPolicy,
    pub gpio: SysfsConfig,
    pub output: OutputConfig,
}

impl AppConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse config file as TOML")?;

        config.pins.validate().with_context(|| "Invalid [pins] section")?;
        Ok(config)
    }

    /// Load the file if it exists, otherwise fall back to defaults.
    ///
    /// A file that exists but does not parse is still an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("⚠️ Config file {} not found, using defaults", path.display());
            return Ok(Self::new());
        }
        Self::load_from_file(path)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize config to TOML")?;

        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }
}

/// Where the Linux sysfs GPIO interface lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SysfsConfig {
    /// Root of the sysfs GPIO class
    pub sysfs_root: String,

    /// Number of the first line of the header's GPIO chip. Newer kernels
    /// number the Raspberry Pi header from 512 instead of 0.
    pub base: u32,
}

impl Default for SysfsConfig {
    fn default() -> Self {
        Self {
            sysfs_root: "/sys/class/gpio".to_string(),
            base: 0,
        }
    }
}

/// Reading output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One fixed-width console line per attempt
    #[default]
    Text,
    /// One JSON object per attempt
    Json,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_roundtrip() {
        let mut original_config = AppConfig::new();
        original_config.pins.power = 17;
        original_config.protocol.poll_budget = 5_000_000;
        original_config.output.format = OutputFormat::Json;

        let temp_file = NamedTempFile::new().unwrap();
        let temp_path = temp_file.path();

        // Save and load
        original_config.save_to_file(temp_path).unwrap();
        let loaded_config = AppConfig::load_from_file(temp_path).unwrap();

        assert_eq!(original_config, loaded_config);
    }

    #[test]
    fn test_default_values() {
        let config = AppConfig::new();

        assert_eq!((config.pins.power, config.pins.clock, config.pins.data), (10, 9, 11));
        assert_eq!(config.protocol.start_pulse_min, 45);
        assert_eq!(config.protocol.start_pulse_max, 60);
        assert_eq!(config.protocol.oversample, 3);
        assert_eq!(config.reader.settle_us, 1_500);
        assert_eq!(config.reader.idle_sleep_ms, 300);
        assert_eq!(config.gpio.sysfs_root, "/sys/class/gpio");
        assert_eq!(config.output.format, OutputFormat::Text);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_file = NamedTempFile::new().unwrap();
        let content = "[pins]\npower = 4\n\n[output]\nformat = \"json\"\n";
        std::fs::write(temp_file.path(), content).unwrap();

        let config = AppConfig::load_from_file(temp_file.path()).unwrap();
        assert_eq!(config.pins.power, 4);
        assert_eq!(config.pins.clock, 9);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert_eq!(config.protocol, ProtocolConfig::default());
    }

    #[test]
    fn test_duplicate_pins_rejected() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "[pins]\npower = 9\n").unwrap();
        assert!(AppConfig::load_from_file(temp_file.path()).is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, AppConfig::new());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "[pins\npower = ").unwrap();
        assert!(AppConfig::load_or_default(temp_file.path()).is_err());
    }
}
