//! Mode selectors
//!
//! One selector per enumerated characteristic. Options are the mode names and
//! selecting one sends the mode's numeric value.

use super::{Entity, EntityDescription};
use crate::bridge::DeviceControl;
use crate::error::{BridgeError, BridgeResult};
use crate::protocol::device::{
    ControlMode, DeviceCharacteristics, DeviceMode, ParentalMode, RgbMode,
};
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectKind {
    ParentalMode,
    ControlMode,
    RgbMode,
}

fn names<M: DeviceMode>() -> Vec<&'static str> {
    M::ALL.iter().map(|mode| mode.name()).collect()
}

fn value_of<M: DeviceMode>(option: &str) -> Option<u8> {
    M::from_name(option).map(DeviceMode::value)
}

impl SelectKind {
    pub const ALL: [SelectKind; 3] = [
        SelectKind::ParentalMode,
        SelectKind::ControlMode,
        SelectKind::RgbMode,
    ];

    pub fn description(&self) -> &'static EntityDescription {
        const PARENTAL: EntityDescription = EntityDescription {
            key: "shower_parental_mode",
            name: "Shower Parental Mode",
            icon: Some("mdi:account-lock"),
            unit: None,
        };
        const CONTROL: EntityDescription = EntityDescription {
            key: "shower_control_mode",
            name: "Shower Control Mode",
            icon: Some("mdi:refresh-auto"),
            unit: None,
        };
        const RGB: EntityDescription = EntityDescription {
            key: "shower_rgb_mode",
            name: "Shower RGB Mode",
            icon: Some("mdi:led-on"),
            unit: None,
        };

        match self {
            SelectKind::ParentalMode => &PARENTAL,
            SelectKind::ControlMode => &CONTROL,
            SelectKind::RgbMode => &RGB,
        }
    }

    /// Command and field name on the wire
    pub fn wire_key(&self) -> &'static str {
        match self {
            SelectKind::ParentalMode => "Parental_Mode",
            SelectKind::ControlMode => "Control_Mode",
            SelectKind::RgbMode => "Rgb_Mode",
        }
    }

    pub fn options(&self) -> Vec<&'static str> {
        match self {
            SelectKind::ParentalMode => names::<ParentalMode>(),
            SelectKind::ControlMode => names::<ControlMode>(),
            SelectKind::RgbMode => names::<RgbMode>(),
        }
    }

    fn current(&self, chars: &DeviceCharacteristics) -> Option<&'static str> {
        match self {
            SelectKind::ParentalMode => chars.parental_mode.map(DeviceMode::name),
            SelectKind::ControlMode => chars.control_mode.map(DeviceMode::name),
            SelectKind::RgbMode => chars.rgb_mode.map(DeviceMode::name),
        }
    }

    fn value_of(&self, option: &str) -> Option<u8> {
        match self {
            SelectKind::ParentalMode => value_of::<ParentalMode>(option),
            SelectKind::ControlMode => value_of::<ControlMode>(option),
            SelectKind::RgbMode => value_of::<RgbMode>(option),
        }
    }
}

pub struct SelectEntity {
    kind: SelectKind,
    control: Arc<dyn DeviceControl>,
}

impl SelectEntity {
    pub fn new(kind: SelectKind, control: Arc<dyn DeviceControl>) -> Self {
        Self { kind, control }
    }

    pub fn kind(&self) -> SelectKind {
        self.kind
    }

    pub fn current_option(&self) -> Option<&'static str> {
        let chars = self.control.snapshot()?.characteristics?;
        self.kind.current(&chars)
    }

    pub async fn select_option(&self, option: &str) -> BridgeResult<()> {
        let value = self.kind.value_of(option).ok_or_else(|| {
            BridgeError::general(format!(
                "Unknown option {option:?} for {}, expected one of {:?}",
                self.kind.wire_key(),
                self.kind.options()
            ))
        })?;
        self.control
            .send_command(self.kind.wire_key(), Some(json!(value)))
            .await
    }
}

impl Entity for SelectEntity {
    fn description(&self) -> &EntityDescription {
        self.kind.description()
    }

    fn control(&self) -> &dyn DeviceControl {
        self.control.as_ref()
    }

    fn state(&self) -> Option<Value> {
        self.current_option().map(|option| json!(option))
    }
}
