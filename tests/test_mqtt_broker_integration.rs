//! Integration tests against a real MQTT broker
//!
//! Need a broker on `localhost:1883` (e.g. `mosquitto -p 1883`). Run with
//! `cargo test --test test_mqtt_broker_integration -- --ignored`.
//!
//! A second rumqttc client plays the shower: it listens on `{id}_AS` and answers on
//! `{id}_SA` like the firmware does.

mod test_helpers;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde_json::{json, Value};
use std::time::Duration;
use test_helpers::test_config;
use tokio::task::JoinHandle;
use zagonel_bridge::bridge::DeviceSession;
use zagonel_bridge::protocol::{Command, TopicBuilder};
use zagonel_bridge::testing::MockDevice;
use zagonel_bridge::transport::mqtt::{ConnectionState, MqttClient};

fn broker_config(device_id: &str) -> zagonel_bridge::BridgeConfig {
    let mut config = test_config();
    config.device.id = device_id.to_string();
    config.polling.command_timeout_ms = 2000;
    config
}

/// Spawn a simulated shower answering on the broker
async fn spawn_device(device_id: &str) -> (AsyncClient, JoinHandle<()>) {
    let mut options = MqttOptions::new(format!("sim-{device_id}"), "localhost", 1883);
    options.set_keep_alive(Duration::from_secs(30));
    let (client, mut event_loop) = AsyncClient::new(options, 16);
    client
        .subscribe(TopicBuilder::build_outbound_topic(device_id), QoS::AtMostOnce)
        .await
        .unwrap();

    let replies = client.clone();
    let reply_topic = TopicBuilder::build_inbound_topic(device_id);
    let mut device = MockDevice::new(device_id);

    let handle = tokio::spawn(async move {
        while let Ok(event) = event_loop.poll().await {
            let Event::Incoming(Packet::Publish(publish)) = event else {
                continue;
            };
            let Ok(command) = serde_json::from_slice::<Command>(&publish.payload) else {
                continue;
            };
            if let Some(reply) = device.respond(&command) {
                let _ = replies
                    .publish(&reply_topic, QoS::AtMostOnce, false, reply.to_string())
                    .await;
            }
        }
    });

    // Let the subscription settle before commands start flowing
    tokio::time::sleep(Duration::from_millis(200)).await;
    (client, handle)
}

#[tokio::test]
#[ignore]
async fn test_connect_to_real_broker() {
    // Arrange
    let config = broker_config("ZGIT01");
    let mut client = MqttClient::new(&config.device.id, config.mqtt.clone())
        .expect("Client creation should succeed");

    // Act
    let result = client.connect().await;

    // Assert
    assert!(result.is_ok(), "Should connect to real broker: {result:?}");
    assert!(client.is_connected());
    assert_eq!(client.connection_state(), Some(ConnectionState::Connected));

    client.disconnect().await.unwrap();
    assert!(!client.is_connected());
}

#[tokio::test]
#[ignore]
async fn test_session_round_trip_with_simulated_device() {
    let (device_client, device_task) = spawn_device("ZGIT02").await;
    let config = broker_config("ZGIT02");
    let transport = MqttClient::new(&config.device.id, config.mqtt.clone()).unwrap();

    let session = DeviceSession::start(config, transport)
        .await
        .expect("session should load from the simulated device");

    let snapshot = session.snapshot().unwrap();
    assert_eq!(snapshot.device_id(), Some("ZGIT02"));
    assert!(!session.is_running());

    let reply = session
        .send("Buzzer_Volume", Some(json!(35)))
        .await
        .unwrap();
    assert_eq!(reply.fields["Buzzer_Volume"], json!(35));

    session.release().await;
    let _ = device_client.disconnect().await;
    device_task.abort();
}

#[tokio::test]
#[ignore]
async fn test_command_times_out_without_device() {
    let config = broker_config("ZGIT03");
    let mut client = MqttClient::new(&config.device.id, config.mqtt.clone()).unwrap();
    client.connect().await.unwrap();
    let gateway = zagonel_bridge::bridge::CommandGateway::new(
        "ZGIT03",
        client,
        Duration::from_millis(500),
    );

    let err = gateway.send(Command::get_status()).await.unwrap_err();

    assert!(err.is_communication());
    assert_eq!(gateway.pending_count(), 0);
    gateway.disconnect().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_foreign_topics_are_not_delivered() {
    let (device_client, device_task) = spawn_device("ZGIT04").await;
    let config = broker_config("ZGIT04");
    let transport = MqttClient::new(&config.device.id, config.mqtt.clone()).unwrap();
    let session = DeviceSession::start(config, transport).await.unwrap();
    let before = session.snapshot();

    let stray: Value = json!({"Type": "Status", "St": "RUN"});
    device_client
        .publish("ZGIT99_SA", QoS::AtMostOnce, false, stray.to_string())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(session.snapshot(), before);
    assert!(!session.is_running());

    session.release().await;
    let _ = device_client.disconnect().await;
    device_task.abort();
}
