//! Zagonel smart shower bridge
//!
//! Connects a Zagonel shower to its MQTT broker and exposes it as a typed device state
//! model for home automation platforms.
//!
//! # Overview
//!
//! The shower speaks a tiny JSON protocol over two topics per device: commands go to
//! `{device_id}_AS`, replies and telemetry come back on `{device_id}_SA`. Replies carry
//! no request identifier, so this crate provides:
//! - a pending-call registry that pairs each reply with the waiting caller
//! - a state reconciler folding partial `Chars`/`Status` payloads into one snapshot
//! - a command gateway with run-state preconditions and bounded waits
//! - a debounced refresh scheduler and a fixed-interval poll loop
//! - typed entity views (climate, light, selects, number, time, sensors)
//!
//! # Quick Start
//!
//! ```rust
//! use zagonel_bridge::protocol::{Command, InboundMessage, MessageType};
//! use zagonel_bridge::state::StateReconciler;
//! use serde_json::json;
//!
//! // Outbound commands serialize compactly
//! let command = Command::with_value("Buzzer_Volume", json!(40));
//! assert_eq!(command.to_payload().unwrap(), r#"{"command":"Buzzer_Volume","value":40}"#);
//!
//! // Partial inbound payloads merge into one snapshot
//! let reconciler = StateReconciler::new();
//! for payload in [
//!     json!({"Type": "Status", "St": "RUN", "To": 45000, "Ts": 50000}),
//!     json!({"Type": "Status", "Vi": 24000}),
//! ] {
//!     let message = InboundMessage::from_value(payload).unwrap();
//!     assert_eq!(message.kind, MessageType::Status);
//!     reconciler.apply(&message);
//! }
//!
//! let status = reconciler.snapshot().unwrap().status.unwrap();
//! assert_eq!(status.temperature_out, Some(45000));
//! assert_eq!(status.voltage, Some(24000));
//! assert!(reconciler.is_running());
//! ```

pub mod bridge;
pub mod config;
pub mod entities;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod state;
pub mod testing;
pub mod transport;

pub use bridge::{CommandGateway, DeviceControl, DeviceSession, RefreshOutcome};
pub use config::*;
pub use error::{BridgeError, BridgeResult};
pub use protocol::*;
pub use state::StateReconciler;
