//! LED ring as an RGB light
//!
//! The light is "on" only in fixed-colour mode; the other ring modes (power and
//! temperature indication) count as off.

use super::{Entity, EntityDescription};
use crate::bridge::DeviceControl;
use crate::error::{BridgeError, BridgeResult};
use crate::protocol::device::{DeviceMode, RgbMode};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

const DESCRIPTION: EntityDescription = EntityDescription {
    key: "shower_light",
    name: "Shower light",
    icon: Some("mdi:led-strip"),
    unit: None,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RgbColor(pub u8, pub u8, pub u8);

impl FromStr for RgbColor {
    type Err = BridgeError;

    /// Parses `#RRGGBB`, case-insensitive
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BridgeError::general(format!("Invalid colour {s:?}"));
        let hex = s.strip_prefix('#').ok_or_else(invalid)?;
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(invalid());
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|_| invalid())
        };
        Ok(RgbColor(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

impl fmt::Display for RgbColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }
}

pub struct LightEntity {
    control: Arc<dyn DeviceControl>,
}

impl LightEntity {
    pub fn new(control: Arc<dyn DeviceControl>) -> Self {
        Self { control }
    }

    pub fn is_on(&self) -> bool {
        self.control
            .snapshot()
            .and_then(|snapshot| snapshot.characteristics)
            .and_then(|chars| chars.rgb_mode)
            == Some(RgbMode::Fixed)
    }

    /// None when no colour was reported or it is not `#RRGGBB`
    pub fn rgb_color(&self) -> Option<RgbColor> {
        self.control
            .snapshot()?
            .characteristics?
            .rgb_color?
            .parse()
            .ok()
    }

    /// Switch to fixed-colour mode if needed, then apply `color`
    pub async fn turn_on(&self, color: Option<RgbColor>) -> BridgeResult<()> {
        if !self.is_on() {
            self.control
                .send_command("Rgb_Mode", Some(json!(RgbMode::Fixed.value())))
                .await?;
        }
        if let Some(color) = color {
            self.control
                .send_command("Rgb_Color", Some(json!(color.to_string())))
                .await?;
        }
        Ok(())
    }

    pub async fn turn_off(&self) -> BridgeResult<()> {
        self.control
            .send_command("Rgb_Mode", Some(json!(RgbMode::Power.value())))
            .await
    }
}

impl Entity for LightEntity {
    fn description(&self) -> &EntityDescription {
        &DESCRIPTION
    }

    fn control(&self) -> &dyn DeviceControl {
        self.control.as_ref()
    }

    fn state(&self) -> Option<Value> {
        self.control.snapshot()?.characteristics?;
        let mut state = json!({ "on": self.is_on() });
        if let Some(color) = self.rgb_color() {
            state["rgb_color"] = json!([color.0, color.1, color.2]);
        }
        Some(state)
    }
}
