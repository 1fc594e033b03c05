//! Topic naming and device id validation
//!
//! Each device talks over two topics on the broker: `{device_id}_SA` carries
//! device-to-adapter traffic and `{device_id}_AS` carries adapter-to-device commands.

use thiserror::Error;

/// Suffix of the topic the device publishes on
pub const INBOUND_SUFFIX: &str = "_SA";
/// Suffix of the topic the device listens on
pub const OUTBOUND_SUFFIX: &str = "_AS";

/// Topic construction for a single device
pub struct TopicBuilder;

impl TopicBuilder {
    /// Build device-to-adapter topic: `{device_id}_SA`
    pub fn build_inbound_topic(device_id: &str) -> String {
        format!("{device_id}{INBOUND_SUFFIX}")
    }

    /// Build adapter-to-device topic: `{device_id}_AS`
    pub fn build_outbound_topic(device_id: &str) -> String {
        format!("{device_id}{OUTBOUND_SUFFIX}")
    }
}

pub fn validate_device_id(device_id: &str) -> Result<(), ValidationError> {
    if device_id.is_empty() {
        return Err(ValidationError::EmptyDeviceId);
    }

    for ch in device_id.chars() {
        if ch.is_whitespace() || ch.is_control() || matches!(ch, '+' | '#' | '/') {
            return Err(ValidationError::InvalidDeviceIdChar(ch));
        }
    }

    Ok(())
}

/// Validation errors for device identifiers
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Device ID cannot be empty")]
    EmptyDeviceId,
    #[error("Device ID contains invalid character: '{0:?}'")]
    InvalidDeviceIdChar(char),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_topic_construction() {
        assert_eq!(TopicBuilder::build_inbound_topic("ZG0001"), "ZG0001_SA");
        assert_eq!(TopicBuilder::build_outbound_topic("ZG0001"), "ZG0001_AS");
    }

    #[test]
    fn test_validate_device_id() {
        assert!(validate_device_id("ZG0001").is_ok());
        assert!(validate_device_id("a1b2-c3_d4.e5").is_ok());

        assert_eq!(validate_device_id(""), Err(ValidationError::EmptyDeviceId));
        assert_eq!(
            validate_device_id("ZG 0001"),
            Err(ValidationError::InvalidDeviceIdChar(' '))
        );
        assert_eq!(
            validate_device_id("ZG/0001"),
            Err(ValidationError::InvalidDeviceIdChar('/'))
        );
        assert_eq!(
            validate_device_id("ZG#"),
            Err(ValidationError::InvalidDeviceIdChar('#'))
        );
        assert_eq!(
            validate_device_id("+"),
            Err(ValidationError::InvalidDeviceIdChar('+'))
        );
    }

    proptest! {
        #[test]
        fn valid_ids_never_produce_wildcard_topics(id in "[A-Za-z0-9._-]{1,32}") {
            prop_assert!(validate_device_id(&id).is_ok());
            let inbound = TopicBuilder::build_inbound_topic(&id);
            let outbound = TopicBuilder::build_outbound_topic(&id);
            prop_assert!(!inbound.contains('+') && !inbound.contains('#'));
            prop_assert_ne!(inbound, outbound);
        }
    }
}
