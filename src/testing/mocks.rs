//! Mock implementations for testing
//!
//! [`MockTransport`] stands in for the broker connection and [`MockDevice`] for the
//! shower behind it. Replies are delivered from a spawned task, so inbound delivery
//! runs concurrently with the caller just as it does on the real broker.

use crate::protocol::messages::{Command, GET_CHARS, GET_STATUS};
use crate::transport::mqtt::{ConnectionState, MqttError};
use crate::transport::{InboundHandler, Transport};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Simulated shower answering commands like the real firmware
#[derive(Debug, Clone)]
pub struct MockDevice {
    chars: Map<String, Value>,
    status: Map<String, Value>,
}

impl MockDevice {
    pub fn new(device_id: &str) -> Self {
        let chars = json!({
            "User_Id": "user-1",
            "Device_Id": device_id,
            "Hw_Id": "HW01",
            "Hw_Version": "1.0",
            "Fw_Version": "2.3.1",
            "Fw_Timestamp": "2023-05-01T10:00:00",
            "Control_Mode": 0,
            "Rgb_Mode": 1,
            "Rgb_Color": "#00FF00",
            "Buzzer_Volume": 50,
            "Parental_Mode": 0,
            "Parental_Limit": 900,
            "Preset_1": 38000,
            "Preset_2": 40000,
            "Preset_3": 42000,
            "Preset_4": 45000,
            "Wifi_SSID": "home"
        });
        let status = json!({
            "St": "STOP",
            "Fl": 0,
            "Vi": 220000,
            "Ti": 24000,
            "To": 24000,
            "Ts": 38000,
            "Ps": 0,
            "De": 8000,
            "Pw": 0,
            "Hp": 0,
            "Up": 3600,
            "Pp": 0,
            "Wi": -60
        });

        Self {
            chars: as_object(chars),
            status: as_object(status),
        }
    }

    pub fn set_running(&mut self, running: bool) {
        let state = if running { "RUN" } else { "STOP" };
        self.status.insert("St".to_string(), json!(state));
    }

    pub fn set_status_field(&mut self, key: &str, value: Value) {
        self.status.insert(key.to_string(), value);
    }

    pub fn chars_field(&self, key: &str) -> Option<&Value> {
        self.chars.get(key)
    }

    fn is_running(&self) -> bool {
        self.status.get("St") == Some(&json!("RUN"))
    }

    /// Reply the firmware would publish for `command`, None when it stays quiet
    pub fn respond(&mut self, command: &Command) -> Option<Value> {
        match command.command.as_str() {
            GET_STATUS => Some(tagged("Status", &self.status)),
            GET_CHARS if self.is_running() => None,
            GET_CHARS => Some(tagged("Chars", &self.chars)),
            field if self.chars.contains_key(field) => {
                let value = command.value.clone()?;
                self.chars.insert(field.to_string(), value.clone());
                if field == "Preset_1" {
                    self.status.insert("Ts".to_string(), value.clone());
                }
                let mut echo = Map::new();
                echo.insert(field.to_string(), value);
                Some(tagged("Chars", &echo))
            }
            _ => None,
        }
    }
}

fn as_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn tagged(kind: &str, fields: &Map<String, Value>) -> Value {
    let mut payload = fields.clone();
    payload.insert("Type".to_string(), json!(kind));
    Value::Object(payload)
}

#[derive(Default)]
struct MockState {
    connected: AtomicBool,
    connect_calls: AtomicUsize,
    fail_connect: AtomicBool,
    fail_publish: AtomicBool,
    published: Mutex<Vec<Command>>,
    handler: Mutex<Option<Arc<dyn InboundHandler>>>,
    device: Mutex<Option<MockDevice>>,
    reply_delay: Mutex<Duration>,
}

/// In-memory transport; clones share state so tests can keep a handle
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    /// Transport with nobody listening: every command times out
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport with a simulated shower `ZG0001` behind it
    pub fn with_device() -> Self {
        Self::with_mock_device(MockDevice::new("ZG0001"))
    }

    pub fn with_mock_device(device: MockDevice) -> Self {
        let transport = Self::default();
        *lock(&transport.state.device) = Some(device);
        transport
    }

    pub fn fail_publish(&self, fail: bool) {
        self.state.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn fail_connect(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_reply_delay(&self, delay: Duration) {
        *lock(&self.state.reply_delay) = delay;
    }

    /// Mutate the simulated device, e.g. to start a shower
    pub fn update_device<F: FnOnce(&mut MockDevice)>(&self, update: F) {
        if let Some(device) = lock(&self.state.device).as_mut() {
            update(device);
        }
    }

    pub fn device(&self) -> Option<MockDevice> {
        lock(&self.state.device).clone()
    }

    pub fn published(&self) -> Vec<Command> {
        lock(&self.state.published).clone()
    }

    pub fn published_names(&self) -> Vec<String> {
        lock(&self.state.published)
            .iter()
            .map(|command| command.command.clone())
            .collect()
    }

    pub fn clear_published(&self) {
        lock(&self.state.published).clear();
    }

    pub fn connect_count(&self) -> usize {
        self.state.connect_calls.load(Ordering::SeqCst)
    }

    /// Deliver a payload as if the device had published it, on the caller's task
    pub fn inject(&self, payload: Value) {
        let handler = lock(&self.state.handler).clone();
        if let Some(handler) = handler {
            handler.handle_message(payload.to_string().as_bytes());
        }
    }

    /// Simulate a dropped broker connection
    pub fn drop_connection(&self) {
        self.state.connected.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = MqttError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        self.state.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(MqttError::ConnectionFailedStr(
                "Mock connection failure".to_string(),
            ));
        }
        self.state.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        self.state.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(&self, command: &Command) -> Result<(), Self::Error> {
        if !self.is_connected() {
            return Err(MqttError::NotConnected {
                state: ConnectionState::Disconnected("Mock transport not connected".to_string()),
            });
        }
        if self.state.fail_publish.load(Ordering::SeqCst) {
            return Err(MqttError::PublishFailed("Mock send queue rejected".into()));
        }

        lock(&self.state.published).push(command.clone());

        let reply = lock(&self.state.device)
            .as_mut()
            .and_then(|device| device.respond(command));
        let handler = lock(&self.state.handler).clone();

        if let (Some(reply), Some(handler)) = (reply, handler) {
            let delay = *lock(&self.state.reply_delay);
            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                // A disconnected client receives nothing
                if state.connected.load(Ordering::SeqCst) {
                    handler.handle_message(reply.to_string().as_bytes());
                }
            });
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    fn connection_state(&self) -> Option<ConnectionState> {
        if self.is_connected() {
            Some(ConnectionState::Connected)
        } else if self.connect_count() > 0 {
            Some(ConnectionState::Disconnected("Mock disconnected".to_string()))
        } else {
            None
        }
    }

    fn set_message_handler(&self, handler: Arc<dyn InboundHandler>) {
        *lock(&self.state.handler) = Some(handler);
    }
}
