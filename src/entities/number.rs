use super::{Entity, EntityDescription};
use crate::bridge::DeviceControl;
use crate::error::{BridgeError, BridgeResult};
use serde_json::{json, Value};
use std::sync::Arc;

pub const MIN_VOLUME: f64 = 0.0;
pub const MAX_VOLUME: f64 = 100.0;

const DESCRIPTION: EntityDescription = EntityDescription {
    key: "shower_volume",
    name: "Shower Volume",
    icon: Some("mdi:volume-high"),
    unit: Some("%"),
};

/// Buzzer volume, 0 to 100 percent in steps of 1
pub struct VolumeNumber {
    control: Arc<dyn DeviceControl>,
}

impl VolumeNumber {
    pub fn new(control: Arc<dyn DeviceControl>) -> Self {
        Self { control }
    }

    pub fn native_value(&self) -> Option<i64> {
        self.control.snapshot()?.characteristics?.buzzer_volume
    }

    /// Fractional values are truncated
    pub async fn set_native_value(&self, value: f64) -> BridgeResult<()> {
        if !(MIN_VOLUME..=MAX_VOLUME).contains(&value) {
            return Err(BridgeError::general(format!(
                "Volume {value} outside {MIN_VOLUME}..={MAX_VOLUME}"
            )));
        }
        self.control
            .send_command("Buzzer_Volume", Some(json!(value.trunc() as i64)))
            .await
    }
}

impl Entity for VolumeNumber {
    fn description(&self) -> &EntityDescription {
        &DESCRIPTION
    }

    fn control(&self) -> &dyn DeviceControl {
        self.control.as_ref()
    }

    fn state(&self) -> Option<Value> {
        self.native_value().map(|volume| json!(volume))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::test_support::started_session;

    #[tokio::test]
    async fn test_set_truncates_to_integer() {
        let (transport, session) = started_session().await;
        let volume = VolumeNumber::new(session);
        assert_eq!(volume.native_value(), Some(50));

        volume.set_native_value(72.9).await.unwrap();

        assert_eq!(transport.published()[0].value, Some(json!(72)));
        assert_eq!(volume.native_value(), Some(72));
    }

    #[tokio::test]
    async fn test_rejects_out_of_range() {
        let (transport, session) = started_session().await;
        let volume = VolumeNumber::new(session);

        assert!(volume.set_native_value(101.0).await.is_err());
        assert!(volume.set_native_value(-1.0).await.is_err());
        assert!(transport.published().is_empty());
    }
}
