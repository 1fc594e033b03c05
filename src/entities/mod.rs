//! Typed views of the device snapshot
//!
//! Entities are what a host automation platform shows to users. Each one reads the live
//! snapshot through [`DeviceControl`] and changes settings only by sending commands, so
//! every entity stays a thin projection over the session.

use crate::bridge::DeviceControl;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

pub mod climate;
pub mod light;
pub mod number;
pub mod select;
pub mod sensor;
pub mod time;

pub use climate::{ClimateEntity, HvacMode};
pub use light::{LightEntity, RgbColor};
pub use number::VolumeNumber;
pub use select::{SelectEntity, SelectKind};
pub use sensor::{SensorConversion, SensorDescription, SensorEntity, SENSORS};
pub use time::ParentalLimitTime;

pub const DOMAIN: &str = "zagonel";
pub const MANUFACTURER: &str = "Zagonel";
pub const MODEL: &str = "0.0.0";

/// Static metadata of one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityDescription {
    pub key: &'static str,
    pub name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<&'static str>,
}

/// Device registry entry shared by every entity of one shower
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub identifiers: (String, String),
    pub name: String,
    pub model: String,
    pub manufacturer: String,
}

impl DeviceInfo {
    pub fn for_device(device_id: &str) -> Self {
        Self {
            identifiers: (DOMAIN.to_string(), device_id.to_string()),
            name: MANUFACTURER.to_string(),
            model: MODEL.to_string(),
            manufacturer: MANUFACTURER.to_string(),
        }
    }
}

pub trait Entity: Send + Sync {
    fn description(&self) -> &EntityDescription;

    fn control(&self) -> &dyn DeviceControl;

    /// Current state as presented to users, None while the data is missing
    fn state(&self) -> Option<Value>;

    /// `{key}_{slug(Device_Id)}`
    fn unique_id(&self) -> String {
        format!(
            "{}_{}",
            self.description().key,
            slugify(&device_identifier(self.control()))
        )
    }

    fn device_info(&self) -> DeviceInfo {
        DeviceInfo::for_device(&device_identifier(self.control()))
    }

    fn available(&self) -> bool {
        self.control().snapshot().is_some()
    }
}

/// Device id reported by the shower, falling back to the configured one
fn device_identifier(control: &dyn DeviceControl) -> String {
    control
        .snapshot()
        .and_then(|snapshot| snapshot.device_id().map(str::to_string))
        .unwrap_or_else(|| control.device_id().to_string())
}

static NON_ALNUM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("slug pattern is a valid regex"));

/// Lower-case, runs of anything but `[a-z0-9]` collapsed to `_`, no leading or trailing `_`
pub fn slugify(text: &str) -> String {
    NON_ALNUM
        .replace_all(&text.to_lowercase(), "_")
        .trim_matches('_')
        .to_string()
}

/// Every entity exposed for one device
pub struct EntitySet {
    pub climate: ClimateEntity,
    pub light: LightEntity,
    pub selects: Vec<SelectEntity>,
    pub volume: VolumeNumber,
    pub parental_limit: ParentalLimitTime,
    pub sensors: Vec<SensorEntity>,
}

impl EntitySet {
    pub fn for_device(control: Arc<dyn DeviceControl>) -> Self {
        Self {
            climate: ClimateEntity::new(control.clone()),
            light: LightEntity::new(control.clone()),
            selects: SelectKind::ALL
                .iter()
                .map(|kind| SelectEntity::new(*kind, control.clone()))
                .collect(),
            volume: VolumeNumber::new(control.clone()),
            parental_limit: ParentalLimitTime::new(control.clone()),
            sensors: SENSORS
                .iter()
                .map(|description| SensorEntity::new(description, control.clone()))
                .collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Entity> {
        let fixed: [&dyn Entity; 4] = [
            &self.climate,
            &self.light,
            &self.volume,
            &self.parental_limit,
        ];
        fixed
            .into_iter()
            .chain(self.selects.iter().map(|entity| entity as &dyn Entity))
            .chain(self.sensors.iter().map(|entity| entity as &dyn Entity))
    }

    /// `unique_id -> state` for every entity with data
    pub fn states(&self) -> serde_json::Map<String, Value> {
        self.iter()
            .filter_map(|entity| entity.state().map(|state| (entity.unique_id(), state)))
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::bridge::DeviceSession;
    use crate::config::BridgeConfig;
    use crate::testing::MockTransport;
    use std::sync::Arc;

    pub async fn started_session() -> (MockTransport, Arc<DeviceSession<MockTransport>>) {
        let transport = MockTransport::with_device();
        let mut config = BridgeConfig::for_device("ZG0001").unwrap();
        config.polling.command_timeout_ms = 200;
        let session = DeviceSession::start(config, transport.clone()).await.unwrap();
        transport.clear_published();
        (transport, Arc::new(session))
    }
}
