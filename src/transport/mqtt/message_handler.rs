//! Pure message routing for MQTT events
//!
//! Turns rumqttc events into routing decisions and hands accepted payloads
//! to the registered [`InboundHandler`].

use crate::transport::InboundHandler;
use rumqttc::{Event, Packet, SubscribeReasonCode};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Only the device's inbound topic is delivered
    pub fn should_process_message(topic: &str, expected_topic: &str) -> bool {
        if topic != expected_topic {
            debug!("Topic mismatch: expected {}, got {}", expected_topic, topic);
            return false;
        }
        true
    }

    /// Route MQTT event to appropriate handler (pure routing decision)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
                Packet::Publish(publish) => EventRoute::MessageReceived {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                    retain: publish.retain,
                },
                Packet::Disconnect => EventRoute::Disconnected,
                Packet::SubAck(suback) => EventRoute::SubscriptionConfirmed {
                    packet_id: suback.pkid,
                    return_codes: suback.return_codes.clone(),
                },
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Validate subscription success from SubAck (pure function)
    pub fn validate_subscription_success(
        return_codes: &[SubscribeReasonCode],
    ) -> Result<(), String> {
        if return_codes.is_empty()
            || return_codes
                .iter()
                .any(|code| matches!(code, SubscribeReasonCode::Failure))
        {
            Err(format!(
                "Subscription failed with return codes: {return_codes:?}"
            ))
        } else {
            Ok(())
        }
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone)]
pub enum EventRoute {
    ConnectionAcknowledged,
    MessageReceived {
        topic: String,
        payload: Vec<u8>,
        retain: bool,
    },
    Disconnected,
    SubscriptionConfirmed {
        packet_id: u16,
        return_codes: Vec<SubscribeReasonCode>,
    },
    /// PingResp and friends
    InfrastructureEvent(String),
    OutgoingEvent,
}

/// Hands inbound payloads to the registered handler
#[derive(Default)]
pub struct MessageForwarder {
    handler: RwLock<Option<Arc<dyn InboundHandler>>>,
}

impl MessageForwarder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_handler(&self, handler: Arc<dyn InboundHandler>) {
        match self.handler.write() {
            Ok(mut slot) => *slot = Some(handler),
            Err(poisoned) => *poisoned.into_inner() = Some(handler),
        }
    }

    pub fn has_handler(&self) -> bool {
        self.handler
            .read()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    /// Deliver one payload; runs on the transport's receive context
    pub fn forward(&self, payload: &[u8]) -> Result<(), String> {
        let handler = self
            .handler
            .read()
            .map_err(|_| "Handler lock poisoned".to_string())?
            .clone();

        match handler {
            Some(handler) => {
                handler.handle_message(payload);
                Ok(())
            }
            None => {
                warn!("Received MQTT message but no handler configured - message dropped");
                Err("No inbound handler configured".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{ConnAck, ConnectReturnCode, Publish, QoS, SubAck};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingHandler {
        payloads: Mutex<Vec<Vec<u8>>>,
    }

    impl InboundHandler for RecordingHandler {
        fn handle_message(&self, payload: &[u8]) {
            self.payloads.lock().unwrap().push(payload.to_vec());
        }
    }

    #[test]
    fn test_should_process_message() {
        assert!(MessageHandler::should_process_message("ZG0001_SA", "ZG0001_SA"));
        assert!(!MessageHandler::should_process_message("ZG0001_AS", "ZG0001_SA"));
        assert!(!MessageHandler::should_process_message("OTHER_SA", "ZG0001_SA"));
    }

    #[test]
    fn test_route_mqtt_event() {
        let connack = Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::Success,
        }));
        assert!(matches!(
            MessageHandler::route_mqtt_event(&connack),
            EventRoute::ConnectionAcknowledged
        ));

        let disconnect = Event::Incoming(Packet::Disconnect);
        assert!(matches!(
            MessageHandler::route_mqtt_event(&disconnect),
            EventRoute::Disconnected
        ));

        let publish = Event::Incoming(Packet::Publish(Publish::new(
            "ZG0001_SA",
            QoS::AtMostOnce,
            br#"{"Type":"Status"}"#.to_vec(),
        )));
        match MessageHandler::route_mqtt_event(&publish) {
            EventRoute::MessageReceived {
                topic,
                payload,
                retain,
            } => {
                assert_eq!(topic, "ZG0001_SA");
                assert_eq!(payload, br#"{"Type":"Status"}"#);
                assert!(!retain);
            }
            other => panic!("Expected MessageReceived route, got {other:?}"),
        }

        let suback = Event::Incoming(Packet::SubAck(SubAck {
            pkid: 7,
            return_codes: vec![SubscribeReasonCode::Success(QoS::AtMostOnce)],
        }));
        assert!(matches!(
            MessageHandler::route_mqtt_event(&suback),
            EventRoute::SubscriptionConfirmed { packet_id: 7, .. }
        ));

        assert!(matches!(
            MessageHandler::route_mqtt_event(&Event::Incoming(Packet::PingResp)),
            EventRoute::InfrastructureEvent(_)
        ));
    }

    #[test]
    fn test_validate_subscription_success() {
        assert!(MessageHandler::validate_subscription_success(&[
            SubscribeReasonCode::Success(QoS::AtMostOnce)
        ])
        .is_ok());
        assert!(MessageHandler::validate_subscription_success(&[
            SubscribeReasonCode::Failure
        ])
        .is_err());
        assert!(MessageHandler::validate_subscription_success(&[
            SubscribeReasonCode::Success(QoS::AtLeastOnce),
            SubscribeReasonCode::Failure,
        ])
        .is_err());
        assert!(MessageHandler::validate_subscription_success(&[]).is_err());
    }

    #[test]
    fn test_message_forwarder() {
        let forwarder = MessageForwarder::new();
        assert!(!forwarder.has_handler());
        assert!(forwarder.forward(b"{}").is_err());

        let handler = Arc::new(RecordingHandler::default());
        forwarder.set_handler(handler.clone());
        assert!(forwarder.has_handler());
        assert!(forwarder.forward(b"payload").is_ok());

        assert_eq!(*handler.payloads.lock().unwrap(), vec![b"payload".to_vec()]);
    }
}
