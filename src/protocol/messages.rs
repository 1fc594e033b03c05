//! Wire messages exchanged with the shower
//!
//! Outbound commands are compact JSON objects `{"command": <name>, "value"?: <any>}`.
//! Inbound payloads are JSON objects tagged by a `Type` field; the remaining keys are
//! field updates for the tagged record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Request the characteristics record
pub const GET_CHARS: &str = "getChars";
/// Request the status record
pub const GET_STATUS: &str = "getStatus";

/// Key of the inbound type tag
pub const TYPE_KEY: &str = "Type";

/// Kind of inbound payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    Chars,
    Status,
}

impl MessageType {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "Chars" => Some(MessageType::Chars),
            "Status" => Some(MessageType::Status),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Chars => "Chars",
            MessageType::Status => "Status",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound command
///
/// # Examples
/// ```
/// use zagonel_bridge::protocol::Command;
/// use serde_json::json;
///
/// let command = Command::with_value("Buzzer_Volume", json!(40));
/// assert_eq!(
///     command.to_payload().unwrap(),
///     r#"{"command":"Buzzer_Volume","value":40}"#
/// );
/// assert_eq!(Command::get_status().to_payload().unwrap(), r#"{"command":"getStatus"}"#);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Command {
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Command {
    pub fn new<S: Into<String>>(command: S) -> Self {
        Self {
            command: command.into(),
            value: None,
        }
    }

    pub fn with_value<S: Into<String>>(command: S, value: Value) -> Self {
        Self {
            command: command.into(),
            value: Some(value),
        }
    }

    pub fn get_chars() -> Self {
        Self::new(GET_CHARS)
    }

    pub fn get_status() -> Self {
        Self::new(GET_STATUS)
    }

    /// The device ignores these while it is dispensing water
    pub fn is_blocked_while_running(&self) -> bool {
        self.command == GET_CHARS
    }

    /// Reply kind the device answers this command with
    pub fn expected_reply(&self) -> MessageType {
        match self.command.as_str() {
            GET_STATUS => MessageType::Status,
            _ => MessageType::Chars,
        }
    }

    /// Serialize into the compact JSON wire form
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Inbound payload parsing errors
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("Payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("Payload is not a JSON object")]
    NotAnObject,
    #[error("Payload has no Type field")]
    MissingType,
    #[error("Unrecognized payload type: {0}")]
    UnknownType(String),
}

/// Inbound payload with its type tag split off
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub kind: MessageType,
    pub fields: Map<String, Value>,
}

impl InboundMessage {
    pub fn parse(payload: &[u8]) -> Result<Self, MessageError> {
        let value: Value = serde_json::from_slice(payload)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, MessageError> {
        let Value::Object(mut fields) = value else {
            return Err(MessageError::NotAnObject);
        };

        let kind = match fields.remove(TYPE_KEY) {
            Some(Value::String(tag)) => {
                MessageType::parse(&tag).ok_or(MessageError::UnknownType(tag))?
            }
            Some(other) => return Err(MessageError::UnknownType(other.to_string())),
            None => return Err(MessageError::MissingType),
        };

        Ok(Self { kind, fields })
    }
}
