// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// This module handles loading and parsing configuration from config.toml.
// Provides sensible defaults if config file is missing or has errors.

use anyhow::{Context, Result};
use log::LevelFilter;
use serde::Deserialize;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub app: AppConfig,
    pub debug: DebugConfig,
    pub device: DeviceConfig,
    pub compute: ComputeConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Reported to the driver and used as the log prefix
    pub name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "VkCompute".to_string(),
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation: bool,
    pub log_level: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation: false,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct DeviceConfig {
    /// Position in the enumerated physical device list
    pub index: usize,
}

/// The scaffold storage buffer
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ComputeConfig {
    pub buffer_size: u64,
    pub host_visible: bool,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            host_visible: true,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            // Logging isn't up yet
            eprintln!("Failed to load config.toml: {:#}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::parse(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get the default log filter; unknown names mean `Info`
    pub fn log_level(&self) -> LevelFilter {
        self.debug.log_level.parse().unwrap_or(LevelFilter::Info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.app.name, "VkCompute");
        assert!(!config.debug.validation);
        assert_eq!(config.device.index, 0);
        assert_eq!(config.compute.buffer_size, 1000);
        assert!(config.compute.host_visible);
        assert_eq!(config.log_level(), LevelFilter::Info);
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let config = Config::parse(
            r#"
            [debug]
            validation = true

            [compute]
            buffer_size = 4096
            "#,
        )
        .unwrap();

        assert!(config.debug.validation);
        assert_eq!(config.debug.log_level, "info");
        assert_eq!(config.compute.buffer_size, 4096);
        assert!(config.compute.host_visible);
        assert_eq!(config.app.name, "VkCompute");
    }

    #[test]
    fn log_level_names() {
        let mut config = Config::default();
        config.debug.log_level = "DEBUG".to_string();
        assert_eq!(config.log_level(), LevelFilter::Debug);
        config.debug.log_level = "loud".to_string();
        assert_eq!(config.log_level(), LevelFilter::Info);
    }

    #[test]
    fn wrong_type_is_an_error() {
        assert!(Config::parse("[device]\nindex = \"first\"").is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = Config::load_from_path("definitely/not/here/config.toml").unwrap();
        assert_eq!(config.compute.buffer_size, 1000);
    }
}
