//! Session context for one shower
//!
//! A [`DeviceSession`] owns every per-device component and is passed explicitly to
//! whatever needs it. `start` wires and loads, `release` tears down. Dropping a session
//! also disarms its timers.

use super::coordinator::UpdateCoordinator;
use super::gateway::CommandGateway;
use super::scheduler::RefreshScheduler;
use crate::config::BridgeConfig;
use crate::error::BridgeResult;
use crate::protocol::device::DeviceSnapshot;
use crate::protocol::messages::InboundMessage;
use crate::transport::{MqttTransport, Transport};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// What entities need from a device: read the snapshot, send commands
#[async_trait]
pub trait DeviceControl: Send + Sync {
    fn device_id(&self) -> &str;

    fn snapshot(&self) -> Option<DeviceSnapshot>;

    fn is_running(&self) -> bool;

    async fn send_command(&self, name: &str, value: Option<Value>) -> BridgeResult<()>;
}

/// All per-device components behind one handle
///
/// ```
/// use serde_json::json;
/// use zagonel_bridge::bridge::DeviceSession;
/// use zagonel_bridge::config::BridgeConfig;
/// use zagonel_bridge::testing::MockTransport;
///
/// tokio_test::block_on(async {
///     let config = BridgeConfig::for_device("ZG0001").unwrap();
///     let session = DeviceSession::start(config, MockTransport::with_device())
///         .await
///         .unwrap();
///
///     session.send("Buzzer_Volume", Some(json!(40))).await.unwrap();
///     let chars = session.snapshot().unwrap().characteristics.unwrap();
///     assert_eq!(chars.buzzer_volume, Some(40));
///
///     session.release().await;
/// });
/// ```
pub struct DeviceSession<T: Transport + 'static> {
    config: BridgeConfig,
    gateway: Arc<CommandGateway<T>>,
    coordinator: Arc<UpdateCoordinator<T>>,
    scheduler: RefreshScheduler,
    released: AtomicBool,
}

impl DeviceSession<MqttTransport> {
    /// Start a session over the configured broker
    pub async fn connect_mqtt(config: BridgeConfig) -> BridgeResult<Self> {
        let transport = MqttTransport::new(&config.device.id, config.mqtt.clone())?;
        Self::start(config, transport).await
    }
}

impl<T: Transport + 'static> DeviceSession<T> {
    /// Wire the components without touching the network
    pub fn new(config: BridgeConfig, transport: T) -> Self {
        let gateway = Arc::new(CommandGateway::new(
            &config.device.id,
            transport,
            config.polling.command_timeout(),
        ));
        let coordinator = Arc::new(UpdateCoordinator::new(
            gateway.clone(),
            config.polling.update_interval(),
        ));
        let scheduler = RefreshScheduler::new(coordinator.clone(), config.polling.refresh_delay());

        Self {
            config,
            gateway,
            coordinator,
            scheduler,
            released: AtomicBool::new(false),
        }
    }

    /// Wire, perform the first refresh and start polling
    ///
    /// A failed first refresh releases the session and returns the error.
    pub async fn start(config: BridgeConfig, transport: T) -> BridgeResult<Self> {
        config.validate()?;
        let session = Self::new(config, transport);

        if let Err(e) = session.coordinator.first_refresh().await {
            session.release().await;
            return Err(e);
        }

        session.coordinator.start_polling();
        info!(device_id = %session.config.device.id, "Device session started");
        Ok(session)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn gateway(&self) -> &Arc<CommandGateway<T>> {
        &self.gateway
    }

    pub fn coordinator(&self) -> &Arc<UpdateCoordinator<T>> {
        &self.coordinator
    }

    /// Send a command, then ask for a debounced refresh
    pub async fn send(&self, name: &str, value: Option<Value>) -> BridgeResult<InboundMessage> {
        let reply = self.gateway.send_command(name, value).await?;
        self.scheduler.schedule_refresh();
        Ok(reply)
    }

    pub fn refresh_scheduled(&self) -> bool {
        self.scheduler.is_scheduled()
    }

    pub fn snapshot(&self) -> Option<DeviceSnapshot> {
        self.gateway.current_snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.gateway.is_running()
    }

    /// Live snapshot updates, one per inbound message
    pub fn subscribe(&self) -> watch::Receiver<Option<DeviceSnapshot>> {
        self.gateway.subscribe()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Cancel timers, close the coordinator, disconnect and drop the snapshot
    pub async fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }

        self.scheduler.release();
        self.coordinator.close();
        if let Err(e) = self.gateway.disconnect().await {
            warn!(device_id = %self.config.device.id, error = %e, "Disconnect during release failed");
        }
        // A refresh cut short by the disconnect may still be unwinding
        self.coordinator.wait_idle().await;
        self.gateway.reconciler().clear();
        info!(device_id = %self.config.device.id, "Device session released");
    }
}

impl<T: Transport + 'static> fmt::Debug for DeviceSession<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSession")
            .field("device_id", &self.config.device.id)
            .field("running", &self.is_running())
            .field("refresh_scheduled", &self.refresh_scheduled())
            .field("released", &self.is_released())
            .finish()
    }
}

#[async_trait]
impl<T: Transport + 'static> DeviceControl for DeviceSession<T> {
    fn device_id(&self) -> &str {
        &self.config.device.id
    }

    fn snapshot(&self) -> Option<DeviceSnapshot> {
        DeviceSession::snapshot(self)
    }

    fn is_running(&self) -> bool {
        DeviceSession::is_running(self)
    }

    async fn send_command(&self, name: &str, value: Option<Value>) -> BridgeResult<()> {
        self.send(name, value).await.map(|_| ())
    }
}
