//! Pure connection state management for MQTT client
//!
//! This module contains pure functions for connection state management
//! and broker option handling.

use crate::config::MqttSection;
use rumqttc::{MqttOptions, Transport as RumqttcTransport};
use std::time::Duration;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

/// Connection state for MQTT client
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Initial state - attempting to connect
    Connecting,
    /// ConnAck received
    Connected,
    /// Disconnected with reason
    Disconnected(String),
    /// Attempting to reconnect (attempt count)
    Reconnecting(u32),
    /// Max reconnection attempts exceeded
    PermanentlyDisconnected(String),
}

/// Outcome of the inbound topic subscription for the current session
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionState {
    /// Subscribe sent, SubAck outstanding
    Pending,
    Confirmed,
    /// SubAck carried a failure return code
    Rejected(String),
}

/// Reconnection configuration
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of reconnection attempts (None = unlimited)
    pub max_attempts: Option<u32>,
    /// Backoff pattern in milliseconds
    pub backoff_pattern: Vec<u64>,
    /// Delay to use after pattern is exhausted
    pub sustained_delay: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            backoff_pattern: vec![500, 1000, 2500, 5000],
            sustained_delay: 5000,
        }
    }
}

impl ReconnectConfig {
    /// Backoff delay for the given 1-based attempt
    pub fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay)
    }
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),
    #[error("Serialization error")]
    SerializationError(#[source] serde_json::Error),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },
    #[error("Connection failed: {0}")]
    ConnectionFailedStr(String),
}

/// Broker URL scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerScheme {
    Mqtt,
    Mqtts,
    Ws,
    Wss,
}

impl BrokerScheme {
    pub fn parse(scheme: &str) -> Option<Self> {
        match scheme {
            "mqtt" | "tcp" => Some(Self::Mqtt),
            "mqtts" | "ssl" => Some(Self::Mqtts),
            "ws" => Some(Self::Ws),
            "wss" => Some(Self::Wss),
            _ => None,
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Self::Mqtt => 1883,
            Self::Mqtts => 8883,
            Self::Ws => 80,
            Self::Wss => 443,
        }
    }

    pub fn is_websocket(self) -> bool {
        matches!(self, Self::Ws | Self::Wss)
    }
}

/// Broker endpoint resolved from the configured URL
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerEndpoint {
    pub scheme: BrokerScheme,
    pub host: String,
    pub port: u16,
    /// Address handed to rumqttc: the host for TCP, the whole URL for websockets
    pub address: String,
}

pub fn parse_broker_url(broker_url: &str) -> Result<BrokerEndpoint, MqttError> {
    let url =
        Url::parse(broker_url).map_err(|_| MqttError::InvalidBrokerUrl(broker_url.to_string()))?;

    let scheme = BrokerScheme::parse(url.scheme())
        .ok_or_else(|| MqttError::InvalidBrokerUrl(broker_url.to_string()))?;
    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| MqttError::InvalidBrokerUrl(broker_url.to_string()))?
        .to_string();
    let port = url.port().unwrap_or(scheme.default_port());

    let address = if scheme.is_websocket() {
        let path = url.path();
        format!("{}://{host}:{port}{path}", url.scheme())
    } else {
        host.clone()
    };

    Ok(BrokerEndpoint {
        scheme,
        host,
        port,
        address,
    })
}

/// Fresh client id per connection attempt so a stale session never kicks the new one
pub fn generate_client_id(device_id: &str) -> String {
    format!("zagonel-{device_id}-{}", Uuid::new_v4().simple())
}

/// Build rumqttc options from config; credentials are read from the environment here
pub fn configure_mqtt_options(
    device_id: &str,
    config: &MqttSection,
) -> Result<MqttOptions, MqttError> {
    let endpoint = parse_broker_url(&config.broker_url)?;

    let mut mqtt_options = MqttOptions::new(
        generate_client_id(device_id),
        endpoint.address.clone(),
        endpoint.port,
    );

    match endpoint.scheme {
        BrokerScheme::Mqtt => {}
        BrokerScheme::Mqtts => {
            mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
        }
        BrokerScheme::Ws => {
            mqtt_options.set_transport(RumqttcTransport::Ws);
        }
        BrokerScheme::Wss => {
            mqtt_options.set_transport(RumqttcTransport::wss_with_default_config());
        }
    }

    if let Some(username_env) = &config.username_env {
        if let Ok(username) = std::env::var(username_env) {
            let password = config
                .password_env
                .as_ref()
                .and_then(|env_name| std::env::var(env_name).ok())
                .unwrap_or_default();
            mqtt_options.set_credentials(username, password);
        }
    }

    mqtt_options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    mqtt_options.set_clean_session(true);

    Ok(mqtt_options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_mqtt_config(broker_url: &str) -> MqttSection {
        MqttSection {
            broker_url: broker_url.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_reconnect_config_default() {
        let config = ReconnectConfig::default();
        assert_eq!(config.max_attempts, None);
        assert_eq!(config.backoff_pattern, vec![500, 1000, 2500, 5000]);
        assert_eq!(config.sustained_delay, 5000);
    }

    #[test]
    fn test_calculate_backoff_delay() {
        let config = ReconnectConfig::default();
        assert_eq!(config.calculate_backoff_delay(1), 500);
        assert_eq!(config.calculate_backoff_delay(2), 1000);
        assert_eq!(config.calculate_backoff_delay(4), 5000);
        assert_eq!(config.calculate_backoff_delay(50), 5000);

        let empty = ReconnectConfig {
            max_attempts: Some(3),
            backoff_pattern: vec![],
            sustained_delay: 42,
        };
        assert_eq!(empty.calculate_backoff_delay(1), 42);
    }

    #[test]
    fn test_parse_default_websocket_broker() {
        let endpoint = parse_broker_url("ws://smartbanho.zagonel.com.br:58083/mqtt").unwrap();
        assert_eq!(endpoint.scheme, BrokerScheme::Ws);
        assert_eq!(endpoint.host, "smartbanho.zagonel.com.br");
        assert_eq!(endpoint.port, 58083);
        assert_eq!(
            endpoint.address,
            "ws://smartbanho.zagonel.com.br:58083/mqtt"
        );
    }

    #[test]
    fn test_parse_scheme_default_ports() {
        assert_eq!(parse_broker_url("mqtt://localhost").unwrap().port, 1883);
        assert_eq!(parse_broker_url("mqtts://broker.example").unwrap().port, 8883);
        assert_eq!(parse_broker_url("wss://broker.example/mqtt").unwrap().port, 443);

        let tcp = parse_broker_url("mqtt://localhost:1884").unwrap();
        assert_eq!(tcp.address, "localhost");
        assert_eq!(tcp.port, 1884);
    }

    #[test]
    fn test_invalid_broker_url() {
        for url in ["invalid-url", "http://localhost:1883", "mqtt://"] {
            assert!(
                matches!(parse_broker_url(url), Err(MqttError::InvalidBrokerUrl(_))),
                "{url} should be rejected"
            );
        }
    }

    #[test]
    fn test_configure_mqtt_options() {
        let options = configure_mqtt_options("ZG0001", &test_mqtt_config("mqtt://localhost:1883"))
            .unwrap();
        assert_eq!(options.broker_address(), ("localhost".to_string(), 1883));
        assert!(options.client_id().starts_with("zagonel-ZG0001-"));
        assert_eq!(options.keep_alive(), Duration::from_secs(60));

        let ws = configure_mqtt_options("ZG0001", &MqttSection::default()).unwrap();
        assert_eq!(ws.broker_address().0, "ws://smartbanho.zagonel.com.br:58083/mqtt");
    }

    #[test]
    fn test_client_ids_are_unique() {
        assert_ne!(generate_client_id("ZG0001"), generate_client_id("ZG0001"));
    }

    #[test]
    fn test_mqtt_error_display() {
        let error = MqttError::NotConnected {
            state: ConnectionState::Disconnected("broker gone".to_string()),
        };
        assert!(error.to_string().contains("broker gone"));
        assert_eq!(
            MqttError::SubscriptionFailed("ZG0001_SA".to_string()).to_string(),
            "Subscription failed: ZG0001_SA"
        );
    }
}
