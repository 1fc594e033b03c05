//! Impure I/O operations for MQTT client
//!
//! This module owns the rumqttc client, the supervisor task that polls the event loop,
//! and the publish path.

use super::connection::{
    configure_mqtt_options, ConnectionState, MqttError, ReconnectConfig, SubscriptionState,
};
use super::health_monitor::{ConnectionEvent, HealthMonitor, ReconnectionDecision};
use super::message_handler::{EventRoute, MessageForwarder, MessageHandler};
use crate::config::MqttSection;
use crate::protocol::{Command, TopicBuilder};
use crate::transport::{InboundHandler, Transport};
use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectionError, EventLoop, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// Capacity of the rumqttc request queue
const REQUEST_QUEUE_CAPACITY: usize = 10;

type SharedEventLoop = Arc<Mutex<EventLoop>>;

/// MQTT transport bound to one device's topic pair
pub struct MqttClient {
    device_id: String,
    config: MqttSection,
    inbound_topic: String,
    outbound_topic: String,
    client: Arc<Mutex<AsyncClient>>,
    event_loop: Option<SharedEventLoop>,
    event_loop_handle: Option<JoinHandle<()>>,
    state_rx: Option<watch::Receiver<ConnectionState>>,
    state_tx: Option<watch::Sender<ConnectionState>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    reconnect_config: ReconnectConfig,
    forwarder: Arc<MessageForwarder>,
}

type ConnectionChannels = (
    (
        watch::Sender<ConnectionState>,
        watch::Receiver<ConnectionState>,
    ),
    (
        watch::Sender<SubscriptionState>,
        watch::Receiver<SubscriptionState>,
    ),
    (watch::Sender<bool>, watch::Receiver<bool>),
);

impl MqttClient {
    pub fn new(device_id: &str, config: MqttSection) -> Result<Self, MqttError> {
        let (client, event_loop) = Self::create_connection(device_id, &config)?;

        Ok(MqttClient {
            device_id: device_id.to_string(),
            inbound_topic: TopicBuilder::build_inbound_topic(device_id),
            outbound_topic: TopicBuilder::build_outbound_topic(device_id),
            config,
            client: Arc::new(Mutex::new(client)),
            event_loop: Some(Arc::new(Mutex::new(event_loop))),
            event_loop_handle: None,
            state_rx: None,
            state_tx: None,
            shutdown_tx: None,
            reconnect_config: ReconnectConfig::default(),
            forwarder: Arc::new(MessageForwarder::new()),
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Used for initial connection and reconnection attempts
    fn create_connection(
        device_id: &str,
        config: &MqttSection,
    ) -> Result<(AsyncClient, EventLoop), MqttError> {
        let mqtt_options = configure_mqtt_options(device_id, config)?;
        Ok(AsyncClient::new(mqtt_options, REQUEST_QUEUE_CAPACITY))
    }

    fn setup_connection_channels() -> ConnectionChannels {
        (
            watch::channel(ConnectionState::Connecting),
            watch::channel(SubscriptionState::Pending),
            watch::channel(false),
        )
    }

    /// Wait for ConnAck followed by a successful SubAck of the inbound topic
    async fn wait_for_connection_confirmation(
        mut state_rx: watch::Receiver<ConnectionState>,
        mut subscription_rx: watch::Receiver<SubscriptionState>,
        timeout: Duration,
    ) -> Result<(), MqttError> {
        let confirmation = async {
            loop {
                match state_rx.borrow_and_update().clone() {
                    ConnectionState::Connected => break,
                    ConnectionState::Disconnected(reason) => {
                        return Err(MqttError::ConnectionFailedStr(reason));
                    }
                    ConnectionState::PermanentlyDisconnected(reason) => {
                        return Err(MqttError::ConnectionFailedStr(format!(
                            "Permanently disconnected: {reason}"
                        )));
                    }
                    ConnectionState::Connecting | ConnectionState::Reconnecting(_) => {}
                }
                state_rx.changed().await.map_err(|_| {
                    MqttError::ConnectionFailedStr("State channel closed".to_string())
                })?;
            }

            loop {
                match subscription_rx.borrow_and_update().clone() {
                    SubscriptionState::Confirmed => return Ok(()),
                    SubscriptionState::Rejected(reason) => {
                        return Err(MqttError::SubscriptionFailed(reason));
                    }
                    SubscriptionState::Pending => {}
                }
                subscription_rx.changed().await.map_err(|_| {
                    MqttError::ConnectionFailedStr("Subscription channel closed".to_string())
                })?;
            }
        };

        match tokio::time::timeout(timeout, confirmation).await {
            Ok(result) => result,
            Err(_) => Err(MqttError::ConnectionFailedStr(
                "ConnAck/SubAck timeout - no connection confirmation received".to_string(),
            )),
        }
    }

    /// Connect, subscribe to `{device_id}_SA` and start the supervisor task
    ///
    /// Returns only after the broker confirmed both the connection and the subscription.
    pub async fn connect(&mut self) -> Result<(), MqttError> {
        if self.is_connected() {
            debug!(device_id = %self.device_id, "MQTT client already connected");
            return Ok(());
        }

        // A stale supervisor from an earlier session owns a dead event loop
        self.stop_supervisor();

        let event_loop = match self.event_loop.take() {
            Some(event_loop) => event_loop,
            None => {
                let (client, event_loop) = Self::create_connection(&self.device_id, &self.config)?;
                *self.client.lock().await = client;
                Arc::new(Mutex::new(event_loop))
            }
        };

        let ((state_tx, state_rx), (subscription_tx, subscription_rx), (shutdown_tx, shutdown_rx)) =
            Self::setup_connection_channels();
        self.state_rx = Some(state_rx.clone());
        self.state_tx = Some(state_tx.clone());
        self.shutdown_tx = Some(shutdown_tx);

        info!(
            device_id = %self.device_id,
            broker = %self.config.broker_url,
            "Connecting to MQTT broker"
        );

        let supervisor = Supervisor {
            device_id: self.device_id.clone(),
            config: self.config.clone(),
            inbound_topic: self.inbound_topic.clone(),
            client: self.client.clone(),
            state_tx,
            subscription_tx,
            shutdown_rx,
            forwarder: self.forwarder.clone(),
            reconnect_config: self.reconnect_config.clone(),
            reconnect_attempts: 0,
        };
        let span = crate::mqtt_span!(device_id = %self.device_id, topic = %self.inbound_topic);
        self.event_loop_handle = Some(tokio::spawn(supervisor.run(event_loop).instrument(span)));

        if let Err(e) = Self::wait_for_connection_confirmation(
            state_rx,
            subscription_rx,
            self.config.connect_timeout(),
        )
        .await
        {
            error!(device_id = %self.device_id, error = %e, "MQTT connection not confirmed");
            self.stop_supervisor();
            if let Some(state_tx) = &self.state_tx {
                state_tx.send_replace(ConnectionState::Disconnected(e.to_string()));
            }
            return Err(e);
        }

        info!(
            device_id = %self.device_id,
            topic = %self.inbound_topic,
            "MQTT connected and subscribed"
        );
        Ok(())
    }

    /// Perform interruptible sleep with shutdown monitoring
    /// Returns true if sleep completed, false if shutdown requested
    async fn interruptible_sleep(shutdown_rx: &mut watch::Receiver<bool>, delay_ms: u64) -> bool {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("Shutdown signal received during reconnection delay, stopping");
                    return false;
                }
                true
            }
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => true,
        }
    }

    fn stop_supervisor(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            shutdown_tx.send_replace(true);
        }
        if let Some(handle) = self.event_loop_handle.take() {
            handle.abort();
        }
    }

    /// Graceful shutdown: queue a DISCONNECT, stop the supervisor, wait briefly for it
    pub async fn disconnect(&mut self) -> Result<(), MqttError> {
        if self.event_loop_handle.is_some() {
            let client = self.client.lock().await;
            if let Err(e) = client.try_disconnect() {
                debug!("Could not queue MQTT disconnect: {}", e);
            }
        }

        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            shutdown_tx.send_replace(true);
            debug!("Sent shutdown signal to MQTT supervisor");
        }

        if let Some(handle) = self.event_loop_handle.take() {
            match tokio::time::timeout(Duration::from_secs(2), handle).await {
                Ok(Ok(())) => debug!("MQTT supervisor shut down gracefully"),
                Ok(Err(e)) if !e.is_cancelled() => {
                    warn!("MQTT supervisor ended with error: {}", e);
                }
                Err(_) => warn!("MQTT supervisor didn't shut down gracefully, aborted"),
                _ => {}
            }
        }

        if let Some(state_tx) = &self.state_tx {
            state_tx.send_replace(ConnectionState::Disconnected(
                "Client disconnected".to_string(),
            ));
        }

        info!(device_id = %self.device_id, "MQTT client disconnected");
        Ok(())
    }

    /// Returns None if connect() has not been called yet
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.state_rx.as_ref().map(|rx| rx.borrow().clone())
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.connection_state(), Some(ConnectionState::Connected))
    }

    fn check_connection_state(&self) -> Result<(), MqttError> {
        let state_rx = self.state_rx.as_ref().ok_or_else(|| {
            MqttError::ConnectionFailedStr("Client not connected: connect() not called".to_string())
        })?;

        let current_state = state_rx.borrow().clone();
        if !HealthMonitor::can_publish(&current_state) {
            return Err(MqttError::NotConnected {
                state: current_state,
            });
        }

        Ok(())
    }

    /// Publish a command on `{device_id}_AS`
    pub async fn publish(&self, command: &Command) -> Result<(), MqttError> {
        self.check_connection_state()?;

        let payload = command.to_payload().map_err(MqttError::SerializationError)?;
        debug!(
            topic = %self.outbound_topic,
            payload = %payload,
            "Publishing command"
        );

        let client = self.client.lock().await;
        client
            .try_publish(&self.outbound_topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| MqttError::PublishFailed(Box::new(e)))?;

        Ok(())
    }

    pub fn set_message_handler(&self, handler: Arc<dyn InboundHandler>) {
        self.forwarder.set_handler(handler);
    }
}

/// State owned by the spawned event loop task
struct Supervisor {
    device_id: String,
    config: MqttSection,
    inbound_topic: String,
    client: Arc<Mutex<AsyncClient>>,
    state_tx: watch::Sender<ConnectionState>,
    subscription_tx: watch::Sender<SubscriptionState>,
    shutdown_rx: watch::Receiver<bool>,
    forwarder: Arc<MessageForwarder>,
    reconnect_config: ReconnectConfig,
    reconnect_attempts: u32,
}

impl Supervisor {
    async fn run(mut self, mut event_loop: SharedEventLoop) {
        info!(device_id = %self.device_id, "Starting MQTT event loop supervisor");

        loop {
            tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping MQTT supervisor");
                        break;
                    }
                }

                event_result = async {
                    let mut guard = event_loop.lock().await;
                    guard.poll().await
                } => {
                    let keep_running = match event_result {
                        Ok(event) => {
                            let route = MessageHandler::route_mqtt_event(&event);
                            self.process_event_route(route, &mut event_loop).await
                        }
                        Err(e) => self.handle_event_loop_error(e, &mut event_loop).await,
                    };
                    if !keep_running {
                        break;
                    }
                }
            }
        }

        info!(device_id = %self.device_id, "MQTT event loop stopped");
    }

    fn transition(&self, event: ConnectionEvent) {
        let next = HealthMonitor::determine_next_state(event);
        let previous = self.state_tx.send_replace(next.clone());
        HealthMonitor::log_state_transition(&previous, &next);
    }

    /// Returns true to continue loop, false to break
    async fn process_event_route(
        &mut self,
        route: EventRoute,
        event_loop: &mut SharedEventLoop,
    ) -> bool {
        match route {
            EventRoute::ConnectionAcknowledged => {
                self.reconnect_attempts = 0;
                self.subscription_tx.send_replace(SubscriptionState::Pending);
                self.transition(ConnectionEvent::ConnAckReceived);
                self.subscribe_inbound().await;
                true
            }
            EventRoute::MessageReceived {
                topic,
                payload,
                retain,
            } => {
                self.handle_message_received(&topic, &payload, retain);
                true
            }
            EventRoute::Disconnected => {
                self.transition(ConnectionEvent::DisconnectedByBroker);
                self.reconnect(event_loop).await
            }
            EventRoute::SubscriptionConfirmed {
                packet_id,
                return_codes,
            } => {
                match MessageHandler::validate_subscription_success(&return_codes) {
                    Ok(()) => {
                        debug!(target: "mqtt_transport", packet_id, "Subscription confirmed: {:?}", return_codes);
                        self.subscription_tx.send_replace(SubscriptionState::Confirmed);
                    }
                    Err(reason) => {
                        error!(topic = %self.inbound_topic, "{}", reason);
                        self.subscription_tx
                            .send_replace(SubscriptionState::Rejected(reason));
                    }
                }
                true
            }
            EventRoute::InfrastructureEvent(event_str) => {
                debug!(target: "mqtt_transport", "MQTT event: {}", event_str);
                true
            }
            EventRoute::OutgoingEvent => true,
        }
    }

    async fn handle_event_loop_error(
        &mut self,
        error: ConnectionError,
        event_loop: &mut SharedEventLoop,
    ) -> bool {
        error!(device_id = %self.device_id, "MQTT event loop error: {}", error);
        self.transition(ConnectionEvent::NetworkError(error.to_string()));
        self.reconnect(event_loop).await
    }

    /// Subscribing from inside the poll loop must not wait on the request queue
    async fn subscribe_inbound(&self) {
        let client = self.client.lock().await;
        match client.try_subscribe(&self.inbound_topic, QoS::AtMostOnce) {
            Ok(()) => debug!(target: "mqtt_transport", "Subscribing to {}", self.inbound_topic),
            Err(e) => {
                error!("Failed to subscribe to {}: {}", self.inbound_topic, e);
                self.subscription_tx
                    .send_replace(SubscriptionState::Rejected(e.to_string()));
            }
        }
    }

    fn handle_message_received(&self, topic: &str, payload: &[u8], retain: bool) {
        debug!(
            target: "mqtt_transport",
            topic = %topic,
            retain,
            payload = %String::from_utf8_lossy(payload),
            "Received MQTT message"
        );

        if !MessageHandler::should_process_message(topic, &self.inbound_topic) {
            return;
        }

        if let Err(e) = self.forwarder.forward(payload) {
            error!("Failed to forward inbound message: {}", e);
        }
    }

    /// Swap in a new client and event loop after the backoff delay
    async fn apply_new_connection(&self, event_loop: &mut SharedEventLoop) {
        match MqttClient::create_connection(&self.device_id, &self.config) {
            Ok((new_client, new_event_loop)) => {
                *event_loop = Arc::new(Mutex::new(new_event_loop));
                *self.client.lock().await = new_client;
                debug!("Created new connection for reconnection attempt");
            }
            Err(e) => {
                error!("Failed to create new connection: {}", e);
            }
        }
    }

    /// Returns true to keep polling, false to stop the supervisor
    async fn reconnect(&mut self, event_loop: &mut SharedEventLoop) -> bool {
        let decision = HealthMonitor::should_attempt_reconnection(
            self.reconnect_attempts,
            &self.reconnect_config,
            *self.shutdown_rx.borrow(),
        );

        match decision {
            ReconnectionDecision::Proceed { attempt, delay_ms } => {
                self.reconnect_attempts = attempt;
                self.transition(ConnectionEvent::ReconnectionStarted(attempt));

                let max_display = self
                    .reconnect_config
                    .max_attempts
                    .map_or("unlimited".to_string(), |max| max.to_string());
                info!(
                    "Attempting reconnection {}/{} after {}ms delay",
                    attempt, max_display, delay_ms
                );

                if !MqttClient::interruptible_sleep(&mut self.shutdown_rx, delay_ms).await {
                    return false;
                }

                self.apply_new_connection(event_loop).await;
                true
            }
            ReconnectionDecision::AbortShutdownRequested => {
                info!("Shutdown signal received, stopping reconnection");
                false
            }
            ReconnectionDecision::AbortMaxAttemptsExceeded { max_attempts } => {
                self.transition(ConnectionEvent::PermanentFailure(format!(
                    "Max reconnection attempts ({max_attempts}) exceeded"
                )));
                false
            }
        }
    }
}

#[async_trait]
impl Transport for MqttClient {
    type Error = MqttError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        MqttClient::connect(self).await
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        MqttClient::disconnect(self).await
    }

    async fn publish(&self, command: &Command) -> Result<(), Self::Error> {
        MqttClient::publish(self, command).await
    }

    fn is_connected(&self) -> bool {
        MqttClient::is_connected(self)
    }

    fn connection_state(&self) -> Option<ConnectionState> {
        MqttClient::connection_state(self)
    }

    fn set_message_handler(&self, handler: Arc<dyn InboundHandler>) {
        MqttClient::set_message_handler(self, handler)
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        // No async here; callers wanting a clean DISCONNECT call disconnect() first
        self.stop_supervisor();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Duration;

    fn test_config() -> MqttSection {
        MqttSection {
            broker_url: "mqtt://localhost:1883".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_setup_connection_channels() {
        let ((state_tx, state_rx), (sub_tx, sub_rx), (shutdown_tx, shutdown_rx)) =
            MqttClient::setup_connection_channels();

        assert_eq!(*state_rx.borrow(), ConnectionState::Connecting);
        assert_eq!(*sub_rx.borrow(), SubscriptionState::Pending);
        assert!(!(*shutdown_rx.borrow()));

        state_tx.send(ConnectionState::Connected).unwrap();
        sub_tx.send(SubscriptionState::Confirmed).unwrap();
        shutdown_tx.send(true).unwrap();
        assert_eq!(*state_rx.borrow(), ConnectionState::Connected);
        assert_eq!(*sub_rx.borrow(), SubscriptionState::Confirmed);
        assert!(*shutdown_rx.borrow());
    }

    #[tokio::test]
    async fn test_wait_for_connection_confirmation_success() {
        // Arrange: ConnAck then SubAck arrive after a short delay
        let ((state_tx, state_rx), (sub_tx, sub_rx), _) = MqttClient::setup_connection_channels();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            state_tx.send_replace(ConnectionState::Connected);
            tokio::time::sleep(Duration::from_millis(10)).await;
            sub_tx.send_replace(SubscriptionState::Confirmed);
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        // Act
        let result = MqttClient::wait_for_connection_confirmation(
            state_rx,
            sub_rx,
            Duration::from_millis(150),
        )
        .await;

        // Assert
        assert!(result.is_ok(), "Should confirm connection: {result:?}");
    }

    #[tokio::test]
    async fn test_wait_for_connection_confirmation_rejected_subscription() {
        let ((state_tx, state_rx), (sub_tx, sub_rx), _) = MqttClient::setup_connection_channels();
        state_tx.send_replace(ConnectionState::Connected);
        sub_tx.send_replace(SubscriptionState::Rejected("return code 0x80".to_string()));

        let result = MqttClient::wait_for_connection_confirmation(
            state_rx,
            sub_rx,
            Duration::from_millis(100),
        )
        .await;

        assert!(matches!(result, Err(MqttError::SubscriptionFailed(reason)) if reason.contains("0x80")));
    }

    #[tokio::test]
    async fn test_wait_for_connection_confirmation_timeout() {
        // Keep senders alive so only the timeout can end the wait
        let ((state_tx, state_rx), (sub_tx, sub_rx), _) = MqttClient::setup_connection_channels();
        state_tx.send_replace(ConnectionState::Connected);

        let result = MqttClient::wait_for_connection_confirmation(
            state_rx,
            sub_rx,
            Duration::from_millis(20),
        )
        .await;
        drop((state_tx, sub_tx));

        let err_msg = result.unwrap_err().to_string();
        assert!(
            err_msg.contains("timeout"),
            "Error should mention timeout, got: {err_msg}"
        );
    }

    #[tokio::test]
    async fn test_wait_for_connection_confirmation_disconnected() {
        let ((state_tx, state_rx), (_sub_tx, sub_rx), _) = MqttClient::setup_connection_channels();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            state_tx.send_replace(ConnectionState::Disconnected("Test disconnect".to_string()));
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let result = MqttClient::wait_for_connection_confirmation(
            state_rx,
            sub_rx,
            Duration::from_millis(100),
        )
        .await;

        assert!(result.unwrap_err().to_string().contains("Test disconnect"));
    }

    #[tokio::test]
    async fn test_interruptible_sleep_completes() {
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);
        assert!(MqttClient::interruptible_sleep(&mut shutdown_rx, 10).await);
    }

    #[tokio::test]
    async fn test_interruptible_sleep_interrupted() {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let _ = shutdown_tx.send(true);
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        assert!(!MqttClient::interruptible_sleep(&mut shutdown_rx, 1000).await);
    }

    #[tokio::test]
    async fn test_state_before_connect() {
        let client = MqttClient::new("ZG0001", test_config()).unwrap();
        assert!(client.connection_state().is_none());
        assert!(!client.is_connected());
        assert_eq!(client.device_id(), "ZG0001");
    }

    #[tokio::test]
    async fn test_publish_fails_without_connection() {
        let client = MqttClient::new("ZG0001", test_config()).unwrap();
        let result = client.publish(&Command::get_status()).await;
        assert!(matches!(result, Err(MqttError::ConnectionFailedStr(_))));
    }

    #[tokio::test]
    async fn test_disconnect_without_connection() {
        let mut client = MqttClient::new("ZG0001", test_config()).unwrap();
        assert!(client.disconnect().await.is_ok());
    }

    #[test]
    fn test_client_is_shareable_across_tasks() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MqttClient>();
        assert_send_sync::<crate::bridge::CommandGateway<MqttClient>>();
    }

    #[test]
    fn test_new_rejects_invalid_broker_url() {
        let config = MqttSection {
            broker_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            MqttClient::new("ZG0001", config),
            Err(MqttError::InvalidBrokerUrl(_))
        ));
    }
}
