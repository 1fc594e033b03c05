//! Transport layer for device communication
//!
//! [`Transport`] abstracts the broker connection so the command path can be driven
//! by the rumqttc client in production and by an in-memory mock in tests.

use crate::protocol::Command;
use std::sync::Arc;

pub mod mqtt;

/// Receiver of raw inbound payloads
///
/// Called from the transport's receive context, concurrently with callers.
pub trait InboundHandler: Send + Sync {
    fn handle_message(&self, payload: &[u8]);
}

/// Transport trait for device communication
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Connect and subscribe to the device's inbound topic; no-op when already connected
    async fn connect(&mut self) -> Result<(), Self::Error>;

    async fn disconnect(&mut self) -> Result<(), Self::Error>;

    /// Publish a command on the device's outbound topic
    ///
    /// Success means the local send queue accepted the message, not that the device got it.
    async fn publish(&self, command: &Command) -> Result<(), Self::Error>;

    fn is_connected(&self) -> bool;

    /// None until `connect` has been called
    fn connection_state(&self) -> Option<mqtt::ConnectionState>;

    /// Register the single handler every inbound payload is delivered to
    fn set_message_handler(&self, handler: Arc<dyn InboundHandler>);
}

/// Type alias for MQTT transport
pub type MqttTransport = mqtt::MqttClient;
