//! Test helpers and utilities for integration tests

use zagonel_bridge::bridge::{CommandGateway, DeviceSession};
use zagonel_bridge::config::{BridgeConfig, DeviceSection, MqttSection, PollingSection};
use zagonel_bridge::testing::MockTransport;
use std::sync::Arc;
use std::time::Duration;

pub const DEVICE_ID: &str = "ZG0001";

/// Configuration with short timings so timeout scenarios finish quickly
#[allow(dead_code)]
pub fn test_config() -> BridgeConfig {
    BridgeConfig {
        device: DeviceSection {
            id: DEVICE_ID.to_string(),
        },
        mqtt: MqttSection {
            broker_url: "mqtt://localhost:1883".to_string(),
            ..MqttSection::default()
        },
        polling: PollingSection {
            update_interval_secs: 60,
            refresh_delay_ms: 100,
            command_timeout_ms: 200,
        },
    }
}

#[allow(dead_code)]
pub fn command_timeout() -> Duration {
    test_config().polling.command_timeout()
}

/// Gateway over a connected mock transport
#[allow(dead_code)]
pub async fn connected_gateway(transport: &MockTransport) -> Arc<CommandGateway<MockTransport>> {
    let gateway = Arc::new(CommandGateway::new(
        DEVICE_ID,
        transport.clone(),
        command_timeout(),
    ));
    gateway.connect().await.expect("mock connect succeeds");
    gateway
}

/// Session started against a responsive simulated shower, history cleared
#[allow(dead_code)]
pub async fn started_session() -> (MockTransport, DeviceSession<MockTransport>) {
    let transport = MockTransport::with_device();
    let session = DeviceSession::start(test_config(), transport.clone())
        .await
        .expect("session starts");
    transport.clear_published();
    (transport, session)
}
