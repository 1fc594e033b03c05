//! Command gateway
//!
//! The only path that talks to the shower. A command is checked against the current
//! run state, registered as a pending call, published, and then awaited for a bounded
//! time. Inbound payloads reach the gateway through [`InboundRouter`], which folds them
//! into the snapshot before resolving the waiting caller, so a caller that gets its reply
//! always sees the state that reply carried.

use super::pending::{PendingCallError, PendingCallRegistry};
use crate::command_span;
use crate::error::{BridgeError, BridgeResult};
use crate::protocol::device::DeviceSnapshot;
use crate::protocol::messages::{Command, InboundMessage};
use crate::state::StateReconciler;
use crate::transport::mqtt::ConnectionState;
use crate::transport::{InboundHandler, Transport};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn, Instrument};

/// Inbound payload path: parse, reconcile, resolve
pub struct InboundRouter {
    reconciler: Arc<StateReconciler>,
    registry: PendingCallRegistry,
}

impl InboundRouter {
    pub fn new(reconciler: Arc<StateReconciler>, registry: PendingCallRegistry) -> Self {
        Self {
            reconciler,
            registry,
        }
    }
}

impl InboundHandler for InboundRouter {
    fn handle_message(&self, payload: &[u8]) {
        let message = match InboundMessage::parse(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!("Ignoring inbound payload: {}", e);
                return;
            }
        };

        self.reconciler.apply(&message);
        self.registry.resolve_one(message);
    }
}

pub struct CommandGateway<T: Transport> {
    device_id: String,
    transport: Mutex<T>,
    reconciler: Arc<StateReconciler>,
    registry: PendingCallRegistry,
    command_timeout: Duration,
}

impl<T: Transport> CommandGateway<T> {
    /// Wire `transport` to a fresh reconciler and registry
    pub fn new(device_id: &str, transport: T, command_timeout: Duration) -> Self {
        Self::with_parts(
            device_id,
            transport,
            Arc::new(StateReconciler::new()),
            PendingCallRegistry::new(),
            command_timeout,
        )
    }

    pub fn with_parts(
        device_id: &str,
        transport: T,
        reconciler: Arc<StateReconciler>,
        registry: PendingCallRegistry,
        command_timeout: Duration,
    ) -> Self {
        transport.set_message_handler(Arc::new(InboundRouter::new(
            reconciler.clone(),
            registry.clone(),
        )));

        Self {
            device_id: device_id.to_string(),
            transport: Mutex::new(transport),
            reconciler,
            registry,
            command_timeout,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Connect unless already connected
    pub async fn connect(&self) -> BridgeResult<()> {
        let mut transport = self.transport.lock().await;
        if transport.is_connected() {
            return Ok(());
        }
        transport
            .connect()
            .await
            .map_err(|e| BridgeError::communication(format!("Failed to connect: {e}")))?;
        info!(device_id = %self.device_id, "Connected to device topics");
        Ok(())
    }

    /// Disconnect and cancel anything still waiting for a reply
    pub async fn disconnect(&self) -> BridgeResult<()> {
        self.registry.cancel_all();
        let mut transport = self.transport.lock().await;
        transport
            .disconnect()
            .await
            .map_err(|e| BridgeError::communication(format!("Failed to disconnect: {e}")))
    }

    pub async fn is_connected(&self) -> bool {
        self.transport.lock().await.is_connected()
    }

    pub async fn connection_state(&self) -> Option<ConnectionState> {
        self.transport.lock().await.connection_state()
    }

    /// Send `{command: name, value?: value}` and wait for the device's reply
    pub async fn send_command(&self, name: &str, value: Option<Value>) -> BridgeResult<InboundMessage> {
        let command = match value {
            Some(value) => Command::with_value(name, value),
            None => Command::new(name),
        };
        self.send(command).await
    }

    pub async fn send(&self, command: Command) -> BridgeResult<InboundMessage> {
        let span = command_span!(device_id = %self.device_id, command = %command.command);
        self.round_trip(command).instrument(span).await
    }

    async fn round_trip(&self, command: Command) -> BridgeResult<InboundMessage> {
        if command.is_blocked_while_running() && self.reconciler.is_running() {
            warn!(command = %command.command, "Refusing command while the shower is running");
            return Err(BridgeError::communication(format!(
                "{} is not accepted while the shower is running",
                command.command
            )));
        }

        // Registered before publishing so an immediate reply cannot be missed
        let mut call = self.registry.register(command.expected_reply());

        {
            let transport = self.transport.lock().await;
            if let Err(e) = transport.publish(&command).await {
                call.cancel();
                error!(command = %command.command, error = %e, "Publish rejected");
                return Err(BridgeError::communication(format!(
                    "Failed to publish {}: {e}",
                    command.command
                )));
            }
        }

        match call.wait(self.command_timeout).await {
            Ok(reply) => {
                debug!(command = %command.command, reply = %reply.kind, "Command acknowledged");
                Ok(reply)
            }
            Err(PendingCallError::TimedOut(timeout)) => {
                warn!(command = %command.command, ?timeout, "No reply from device");
                Err(BridgeError::communication(format!(
                    "No reply to {} within {timeout:?}",
                    command.command
                )))
            }
            Err(e) => Err(BridgeError::communication(format!(
                "{} did not complete: {e}",
                command.command
            ))),
        }
    }

    /// Connect, fetch status, and fetch characteristics unless the shower is running
    pub async fn load_initial_data(&self) -> BridgeResult<()> {
        self.connect().await?;
        self.send(Command::get_status()).await?;

        if self.reconciler.is_running() {
            debug!("Shower is running, skipping characteristics fetch");
        } else {
            self.send(Command::get_chars()).await?;
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.reconciler.is_running()
    }

    pub fn current_snapshot(&self) -> Option<DeviceSnapshot> {
        self.reconciler.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<DeviceSnapshot>> {
        self.reconciler.subscribe()
    }

    pub fn pending_count(&self) -> usize {
        self.registry.pending_count()
    }

    pub(crate) fn reconciler(&self) -> &Arc<StateReconciler> {
        &self.reconciler
    }
}
