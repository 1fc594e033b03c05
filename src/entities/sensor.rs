//! Read-only sensors over status telemetry

use super::{Entity, EntityDescription};
use crate::bridge::DeviceControl;
use crate::protocol::device::DeviceStatus;
use serde_json::{json, Value};
use std::sync::Arc;

/// Rated power the `De` reading counts down from, in watts
const RATED_POWER_W: i64 = 8000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorConversion {
    Raw,
    Lowercase,
    Divide(f64),
    SubtractFrom(i64),
}

impl SensorConversion {
    pub fn apply(&self, raw: Value) -> Value {
        match (self, &raw) {
            (SensorConversion::Lowercase, Value::String(text)) => json!(text.to_lowercase()),
            (SensorConversion::Divide(divisor), Value::Number(n)) => match n.as_f64() {
                Some(value) => json!(value / divisor),
                None => raw,
            },
            (SensorConversion::SubtractFrom(base), Value::Number(n)) => match n.as_i64() {
                Some(value) => json!(base - value),
                None => raw,
            },
            _ => raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorDescription {
    pub entity: EntityDescription,
    pub conversion: SensorConversion,
}

const fn sensor(
    key: &'static str,
    name: &'static str,
    unit: Option<&'static str>,
    conversion: SensorConversion,
) -> SensorDescription {
    SensorDescription {
        entity: EntityDescription {
            key,
            name,
            icon: None,
            unit,
        },
        conversion,
    }
}

pub const SENSORS: &[SensorDescription] = &[
    sensor("St", "State", None, SensorConversion::Lowercase),
    sensor("Fl", "Water Flow", Some("mL/m"), SensorConversion::Raw),
    sensor("Vi", "Voltage", Some("V"), SensorConversion::Divide(1000.0)),
    sensor("Ti", "Ti", None, SensorConversion::Raw),
    sensor(
        "Ts",
        "Current Temperature Target",
        Some("°C"),
        SensorConversion::Divide(1000.0),
    ),
    sensor("Ps", "Current Power Factor", Some("%"), SensorConversion::Raw),
    sensor(
        "De",
        "Target Power",
        Some("W"),
        SensorConversion::SubtractFrom(RATED_POWER_W),
    ),
    sensor("Pw", "Power", Some("W"), SensorConversion::Divide(10.0)),
    sensor("Hp", "Hp", None, SensorConversion::Raw),
    sensor("Up", "Uptime", Some("s"), SensorConversion::Raw),
    sensor("Pp", "Pp", None, SensorConversion::Raw),
    sensor("Wi", "Wifi strength", Some("dB"), SensorConversion::Raw),
];

/// Status field by wire key
fn status_field(status: &DeviceStatus, key: &str) -> Option<Value> {
    let number = |field: Option<i64>| field.map(|value| json!(value));
    match key {
        "St" => status.run_state.as_ref().map(|state| json!(state)),
        "Fl" => number(status.water_flow),
        "Vi" => number(status.voltage),
        "Ti" => number(status.temperature_in),
        "To" => number(status.temperature_out),
        "Ts" => number(status.temperature_target),
        "Ps" => number(status.power_factor),
        "De" => number(status.power_demand),
        "Pw" => number(status.power),
        "Hp" => number(status.hp),
        "Up" => number(status.uptime),
        "Pp" => number(status.pp),
        "Wi" => number(status.wifi_signal),
        _ => None,
    }
}

pub struct SensorEntity {
    description: &'static SensorDescription,
    control: Arc<dyn DeviceControl>,
}

impl SensorEntity {
    pub fn new(description: &'static SensorDescription, control: Arc<dyn DeviceControl>) -> Self {
        Self {
            description,
            control,
        }
    }

    pub fn native_value(&self) -> Option<Value> {
        let status = self.control.snapshot()?.status?;
        let raw = status_field(&status, self.description.entity.key)?;
        Some(self.description.conversion.apply(raw))
    }
}

impl Entity for SensorEntity {
    fn description(&self) -> &EntityDescription {
        &self.description.entity
    }

    fn control(&self) -> &dyn DeviceControl {
        self.control.as_ref()
    }

    fn state(&self) -> Option<Value> {
        self.native_value()
    }
}
