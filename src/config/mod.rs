// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Configuration module

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::control::RuntimeConfig;
use crate::core::TimingConfig;
use crate::sensors::EnvironmentalConfig;
use crate::streaming::NetworkConfig;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application name
    pub app_name: String,

    /// Log level
    pub log_level: String,

    /// Use simulated sensors instead of the I2C bus
    pub demo_mode: bool,

    /// Collector endpoints and reconnect policy
    pub network: NetworkConfig,

    /// Register bus
    pub bus: BusConfig,

    /// BME688 forced-mode acquisition
    pub acquisition: EnvironmentalConfig,

    /// Loop pacing
    pub timing: TimingConfig,

    /// Runtime configuration in effect until a command changes it
    pub runtime: RuntimeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "edgelink".to_string(),
            log_level: "info".to_string(),
            demo_mode: false,
            network: NetworkConfig::default(),
            bus: BusConfig::default(),
            acquisition: EnvironmentalConfig::default(),
            timing: TimingConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Invalid configuration {:?}: {}", path, e))?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("edgelink"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

/// I2C bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Linux I2C character device
    pub i2c_device: String,

    /// BME688 address (0x76 or 0x77)
    pub environmental_address: u16,

    /// BMI270 address (0x68 or 0x69)
    pub motion_address: u16,

    /// BMI270 feature-engine image uploaded during init
    pub motion_init_blob: Option<PathBuf>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            i2c_device: "/dev/i2c-1".to_string(),
            environmental_address: 0x76,
            motion_address: 0x68,
            motion_init_blob: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{Protocol, SensorKind};

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            demo_mode = true

            [network]
            server_host = "10.0.0.5"

            [runtime]
            active_sensor = "BME688"
            protocol = "TCP"
            processing_mode = "RAW"
            window_size = 20
            threshold = 1000

            [acquisition]
            heater_target_c = 320.0
            "#,
        )
        .unwrap();

        assert!(config.demo_mode);
        assert_eq!(config.network.server_host, "10.0.0.5");
        assert_eq!(config.network.control_port, 1234);
        assert_eq!(config.network.reconnect_backoff_ms, 3000);
        assert_eq!(config.runtime.active_sensor, SensorKind::Environmental);
        assert_eq!(config.runtime.protocol, Protocol::Tcp);
        assert_eq!(config.acquisition.heater_target_c, Some(320.0));
        assert_eq!(config.acquisition.max_poll_attempts, 50);
        assert_eq!(config.bus.environmental_address, 0x76);
        assert_eq!(config.timing.error_backoff_ms, 500);
    }

    #[test]
    fn test_load_or_create_writes_defaults() {
        let dir = std::env::temp_dir().join(format!("edgelink-config-{}", std::process::id()));
        let path = dir.join("config.toml");
        let _ = std::fs::remove_dir_all(&dir);

        let created = Config::load_or_create(&path).unwrap();
        assert!(path.exists());

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.runtime, created.runtime);
        assert_eq!(loaded.network.rx_buffer_size, 256);
        assert_eq!(loaded.timing.raw_interval_ms, 100);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = std::env::temp_dir().join(format!("edgelink-bad-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "network = 5").unwrap();

        assert!(Config::load(&path).is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
