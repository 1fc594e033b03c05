//! MQTT client for the shower's cloud broker
//!
//! Split into pure and impure parts:
//!
//! - [`connection`] - connection state, broker URL handling, rumqttc options
//! - [`message_handler`] - event routing and inbound delivery
//! - [`health_monitor`] - reconnection decisions and state transitions
//! - [`client`] - the supervisor task and publish path
//!
//! # Usage
//!
//! ```rust,no_run
//! use zagonel_bridge::config::MqttSection;
//! use zagonel_bridge::protocol::Command;
//! use zagonel_bridge::transport::mqtt::MqttClient;
//!
//! # tokio_test::block_on(async {
//! let config = MqttSection {
//!     broker_url: "mqtt://localhost:1883".to_string(),
//!     ..Default::default()
//! };
//!
//! let mut client = MqttClient::new("ZG0001", config)?;
//! client.connect().await?;
//! client.publish(&Command::get_status()).await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod health_monitor;
pub mod message_handler;

pub use client::MqttClient;
pub use connection::{
    configure_mqtt_options, parse_broker_url, BrokerEndpoint, BrokerScheme, ConnectionState,
    MqttError, ReconnectConfig, SubscriptionState,
};
pub use health_monitor::{ConnectionEvent, HealthMonitor, ReconnectionDecision};
pub use message_handler::{EventRoute, MessageForwarder, MessageHandler};
