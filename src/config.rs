//! Bridge configuration
//!
//! The only required setting is the device identifier. Broker and polling sections
//! fall back to the values the vendor app uses.

use crate::protocol::topics::{validate_device_id, ValidationError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Main bridge configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    pub device: DeviceSection,
    #[serde(default)]
    pub mqtt: MqttSection,
    #[serde(default)]
    pub polling: PollingSection,
}

/// Device section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    /// Device identifier printed on the shower controller
    pub id: String,
}

/// MQTT broker section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// Broker URL (`mqtt://`, `mqtts://`, `ws://` or `wss://`)
    #[serde(default = "default_broker_url")]
    pub broker_url: String,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
    /// MQTT keep alive in seconds
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    /// Time allowed for ConnAck plus SubAck on connect
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            broker_url: default_broker_url(),
            username_env: None,
            password_env: None,
            keep_alive_secs: default_keep_alive(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl MqttSection {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.keep_alive_secs < 5 || self.keep_alive_secs > u64::from(u16::MAX) {
            return Err(ConfigError::InvalidConfig(format!(
                "mqtt.keep_alive_secs must be between 5 and {}",
                u16::MAX
            )));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.connect_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_broker_url() -> String {
    "ws://smartbanho.zagonel.com.br:58083/mqtt".to_string()
}

fn default_keep_alive() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    10
}

/// Polling and command timing section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollingSection {
    /// Platform poll loop interval in seconds
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,
    /// Debounce delay of the refresh scheduler in milliseconds
    #[serde(default = "default_refresh_delay")]
    pub refresh_delay_ms: u64,
    /// Time a command waits for its reply, in milliseconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_ms: u64,
}

impl Default for PollingSection {
    fn default() -> Self {
        Self {
            update_interval_secs: default_update_interval(),
            refresh_delay_ms: default_refresh_delay(),
            command_timeout_ms: default_command_timeout(),
        }
    }
}

impl PollingSection {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.refresh_delay_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.update_interval_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "polling.update_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.command_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "polling.command_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_update_interval() -> u64 {
    5
}

fn default_refresh_delay() -> u64 {
    1000
}

fn default_command_timeout() -> u64 {
    5000
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid device ID: {0}")]
    InvalidDeviceId(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<ValidationError> for ConfigError {
    fn from(error: ValidationError) -> Self {
        ConfigError::InvalidDeviceId(error.to_string())
    }
}

impl BridgeConfig {
    /// Build a configuration with defaults for everything but the device id
    pub fn for_device(device_id: &str) -> Result<Self, ConfigError> {
        let config = Self {
            device: DeviceSection {
                id: device_id.trim().to_string(),
            },
            mqtt: MqttSection::default(),
            polling: PollingSection::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: BridgeConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_device_id(&self.device.id)?;
        self.mqtt.validate()?;
        self.polling.validate()?;
        Ok(())
    }

    fn get_env_var_optional(env_var_name: Option<&String>) -> Option<String> {
        env_var_name.and_then(|name| std::env::var(name).ok())
    }

    /// Get MQTT username from environment variable
    pub fn get_mqtt_username(&self) -> Option<String> {
        Self::get_env_var_optional(self.mqtt.username_env.as_ref())
    }

    /// Get MQTT password from environment variable
    pub fn get_mqtt_password(&self) -> Option<String> {
        Self::get_env_var_optional(self.mqtt.password_env.as_ref())
    }
}
