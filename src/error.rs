//! Error taxonomy for the Zagonel bridge
//!
//! Every public operation reports failures through [`BridgeError`]. The three protocol
//! level kinds (general, communication, authentication) mirror what a host automation
//! platform needs to decide between "retry next interval" and "ask the user to reconfigure".

use thiserror::Error;

/// Main error type for bridge operations
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Catch-all for failures that are neither transport nor credential related
    #[error("{message}")]
    General { message: String },

    /// Publish rejected by the local send queue, reply timeout, or a blocked command
    #[error("Communication error: {message}")]
    Communication { message: String },

    /// Reserved for host-framework mapping, the device protocol has no auth handshake
    #[error("Authentication error: {message}")]
    Authentication { message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl BridgeError {
    /// Create general error
    pub fn general<S: Into<String>>(message: S) -> Self {
        Self::General {
            message: message.into(),
        }
    }

    /// Create communication error
    pub fn communication<S: Into<String>>(message: S) -> Self {
        Self::Communication {
            message: message.into(),
        }
    }

    /// Create authentication error
    pub fn authentication<S: Into<String>>(message: S) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    pub fn is_communication(&self) -> bool {
        matches!(self, Self::Communication { .. })
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }
}

impl From<crate::transport::mqtt::MqttError> for BridgeError {
    fn from(error: crate::transport::mqtt::MqttError) -> Self {
        Self::communication(error.to_string())
    }
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mqtt::{ConnectionState, MqttError};

    #[test]
    fn test_communication_constructor() {
        let error = BridgeError::communication("reply timeout");
        assert!(error.is_communication());
        assert!(!error.is_authentication());
        assert_eq!(error.to_string(), "Communication error: reply timeout");
    }

    #[test]
    fn test_general_constructor() {
        let error = BridgeError::general("Can't change mode from the api");
        assert!(matches!(error, BridgeError::General { .. }));
        assert_eq!(error.to_string(), "Can't change mode from the api");
    }

    #[test]
    fn test_authentication_constructor() {
        let error = BridgeError::authentication("bad credentials");
        assert!(error.is_authentication());
        assert_eq!(error.to_string(), "Authentication error: bad credentials");
    }

    #[test]
    fn test_mqtt_errors_map_to_communication() {
        let error: BridgeError = MqttError::NotConnected {
            state: ConnectionState::Disconnected("broker gone".to_string()),
        }
        .into();
        assert!(error.is_communication());
        assert!(error.to_string().contains("broker gone"));
    }

    #[test]
    fn test_config_error_conversion() {
        let error: BridgeError =
            crate::config::ConfigError::InvalidDeviceId("bad/id".to_string()).into();
        assert!(matches!(error, BridgeError::Config(_)));
        assert!(error.to_string().contains("bad/id"));
    }
}
