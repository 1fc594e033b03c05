//! Shower as a heating climate device

use super::{Entity, EntityDescription};
use crate::bridge::DeviceControl;
use crate::error::{BridgeError, BridgeResult};
use serde_json::{json, Value};
use std::sync::Arc;

pub const MIN_TEMP: f64 = 25.0;
pub const MAX_TEMP: f64 = 50.0;
pub const TEMP_STEP: f64 = 1.0;

const DESCRIPTION: EntityDescription = EntityDescription {
    key: "shower",
    name: "Shower",
    icon: Some("mdi:shower-head"),
    unit: Some("°C"),
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HvacMode {
    Off,
    Heat,
}

impl HvacMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HvacMode::Off => "off",
            HvacMode::Heat => "heat",
        }
    }
}

pub struct ClimateEntity {
    control: Arc<dyn DeviceControl>,
}

impl ClimateEntity {
    pub fn new(control: Arc<dyn DeviceControl>) -> Self {
        Self { control }
    }

    /// Heating while the shower runs
    pub fn hvac_mode(&self) -> HvacMode {
        if self.control.is_running() {
            HvacMode::Heat
        } else {
            HvacMode::Off
        }
    }

    /// Outlet temperature in whole degrees
    pub fn current_temperature(&self) -> Option<i64> {
        self.control
            .snapshot()?
            .status?
            .temperature_out
            .map(whole_degrees)
    }

    pub fn target_temperature(&self) -> Option<i64> {
        self.control
            .snapshot()?
            .status?
            .temperature_target
            .map(whole_degrees)
    }

    /// Write the target as preset 1, in millidegrees
    pub async fn set_temperature(&self, celsius: f64) -> BridgeResult<()> {
        if !(MIN_TEMP..=MAX_TEMP).contains(&celsius) {
            return Err(BridgeError::general(format!(
                "Temperature {celsius} outside {MIN_TEMP}..={MAX_TEMP}"
            )));
        }
        let millidegrees = (celsius * 1000.0).floor() as i64;
        self.control
            .send_command("Preset_1", Some(json!(millidegrees)))
            .await
    }

    pub async fn set_hvac_mode(&self, _mode: HvacMode) -> BridgeResult<()> {
        Err(BridgeError::general("Can't change mode from the api"))
    }
}

fn whole_degrees(millidegrees: i64) -> i64 {
    millidegrees.div_euclid(1000)
}

impl Entity for ClimateEntity {
    fn description(&self) -> &EntityDescription {
        &DESCRIPTION
    }

    fn control(&self) -> &dyn DeviceControl {
        self.control.as_ref()
    }

    fn state(&self) -> Option<Value> {
        self.control.snapshot()?.status?;
        Some(json!(self.hvac_mode().as_str()))
    }
}
