//! Application configuration loaded from a TOML file.
//!
//! Every field has a default matching the deployed installation, so the
//! bridge starts without a config file at all. The file only needs to name
//! the values it overrides.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Broker connection parameters shared by the ingest loop and the
/// one-shot actuator publishes.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    /// Keep-alive interval for the persistent telemetry connection.
    pub keep_alive_secs: u64,
    /// Delay before re-polling the event loop after a connection error.
    pub reconnect_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.9".to_string(),
            port: 1883,
            client_id: "termobot".to_string(),
            keep_alive_secs: 60,
            reconnect_secs: 5,
        }
    }
}

/// Topic names. The wildcard must cover the temperature and humidity
/// topics or no telemetry will arrive.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TopicConfig {
    pub subscribe: String,
    pub temperature: String,
    pub humidity: String,
    pub heater: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            subscribe: "home/#".to_string(),
            temperature: "home/sala/temperature".to_string(),
            humidity: "home/sala/humidity".to_string(),
            heater: "home/sala/stufa".to_string(),
        }
    }
}

/// Thermostat control parameters.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ControlConfig {
    /// Setpoints are accepted only when strictly above this bound.
    pub setpoint_min: f64,
    /// Setpoints are accepted only when strictly below this bound.
    pub setpoint_max: f64,
    /// Setpoint reported while the heater is disabled.
    pub default_setpoint: f64,
    /// Capacity of each hand-off channel; a full channel blocks its producer.
    pub queue_capacity: usize,
    /// Samples retained per telemetry series before the oldest is evicted.
    pub series_capacity: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            setpoint_min: 15.0,
            setpoint_max: 24.0,
            default_setpoint: 16.0,
            queue_capacity: 10,
            series_capacity: 10_000,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    pub broker: BrokerConfig,
    pub topics: TopicConfig,
    pub control: ControlConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl BridgeConfig {
    /// Loads the config from `path`, falling back to defaults when the file
    /// does not exist. A file that exists but fails to parse is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("no config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        let config = toml::from_str(&raw)?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }
}
