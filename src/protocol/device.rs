//! Device state model
//!
//! [`DeviceCharacteristics`] and [`DeviceStatus`] mirror the two payload kinds the shower
//! publishes. Every field is optional until first observed. Fields are written through
//! [`WireRecord::apply_field`], a fixed name-to-decoder table, so partial messages update
//! only what they carry.

use serde::Serialize;
use serde_json::Value;

/// Run state reported in `St` while the shower is dispensing water
pub const RUN_STATE_RUNNING: &str = "RUN";

/// Outcome of applying a single wire field to a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldUpdate {
    /// Field recognised and stored
    Applied,
    /// Field recognised but the value could not be decoded, previous value kept
    Malformed,
    /// Field name not part of this record
    Unknown,
}

/// A record that can absorb wire fields of one message kind
pub trait WireRecord: Default + Clone {
    /// Decode and store one wire field
    fn apply_field(&mut self, key: &str, value: &Value) -> FieldUpdate;
}

/// Enumerated device setting transported as a small integer
pub trait DeviceMode: Copy + Sized + 'static {
    /// All variants in wire order
    const ALL: &'static [Self];

    fn value(self) -> u8;

    fn name(self) -> &'static str;

    fn from_value(value: i64) -> Option<Self> {
        Self::ALL.iter().copied().find(|mode| i64::from(mode.value()) == value)
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|mode| mode.name() == name)
    }
}

macro_rules! device_mode {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $value:literal => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        #[serde(into = "u8")]
        pub enum $name {
            $($variant = $value),+
        }

        impl DeviceMode for $name {
            const ALL: &'static [Self] = &[$($name::$variant),+];

            fn value(self) -> u8 {
                self as u8
            }

            fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl From<$name> for u8 {
            fn from(mode: $name) -> u8 {
                mode.value()
            }
        }
    };
}

device_mode! {
    /// Temperature control strategy
    ControlMode {
        Manual = 0 => "MANUAL",
        Automatic = 1 => "AUTOMATIC",
    }
}

device_mode! {
    /// What the LED ring displays
    RgbMode {
        Power = 0 => "POWER",
        Temperature = 1 => "TEMPERATURE",
        Fixed = 2 => "FIXED",
    }
}

device_mode! {
    /// Action taken when the parental time limit is reached
    ParentalMode {
        Off = 0 => "OFF",
        Sound = 1 => "SOUND",
        Shutdown = 2 => "SHUTDOWN",
        SoundAndShutdown = 3 => "SOUND_AND_SHUTDOWN",
    }
}

fn set_text(slot: &mut Option<String>, value: &Value) -> FieldUpdate {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return FieldUpdate::Malformed,
    };
    *slot = Some(text);
    FieldUpdate::Applied
}

fn set_int(slot: &mut Option<i64>, value: &Value) -> FieldUpdate {
    let number = value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.is_finite())
            .map(|f| f as i64)
    });
    match number {
        Some(n) => {
            *slot = Some(n);
            FieldUpdate::Applied
        }
        None => FieldUpdate::Malformed,
    }
}

fn set_mode<M: DeviceMode>(slot: &mut Option<M>, value: &Value) -> FieldUpdate {
    match value.as_i64().and_then(M::from_value) {
        Some(mode) => {
            *slot = Some(mode);
            FieldUpdate::Applied
        }
        None => FieldUpdate::Malformed,
    }
}

/// Identity and configuration of the shower (`"Type": "Chars"` payloads)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceCharacteristics {
    #[serde(rename = "User_Id", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(rename = "Device_Id", skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(rename = "Hw_Id", skip_serializing_if = "Option::is_none")]
    pub hw_id: Option<String>,
    #[serde(rename = "Hw_Version", skip_serializing_if = "Option::is_none")]
    pub hw_version: Option<String>,
    #[serde(rename = "Fw_Version", skip_serializing_if = "Option::is_none")]
    pub fw_version: Option<String>,
    #[serde(rename = "Fw_Timestamp", skip_serializing_if = "Option::is_none")]
    pub fw_timestamp: Option<String>,
    #[serde(rename = "Control_Mode", skip_serializing_if = "Option::is_none")]
    pub control_mode: Option<ControlMode>,
    #[serde(rename = "Rgb_Mode", skip_serializing_if = "Option::is_none")]
    pub rgb_mode: Option<RgbMode>,
    /// `#RRGGBB`
    #[serde(rename = "Rgb_Color", skip_serializing_if = "Option::is_none")]
    pub rgb_color: Option<String>,
    /// Percent, 0 to 100
    #[serde(rename = "Buzzer_Volume", skip_serializing_if = "Option::is_none")]
    pub buzzer_volume: Option<i64>,
    #[serde(rename = "Parental_Mode", skip_serializing_if = "Option::is_none")]
    pub parental_mode: Option<ParentalMode>,
    /// Seconds
    #[serde(rename = "Parental_Limit", skip_serializing_if = "Option::is_none")]
    pub parental_limit: Option<i64>,
    /// Millidegrees Celsius
    #[serde(rename = "Preset_1", skip_serializing_if = "Option::is_none")]
    pub preset_1: Option<i64>,
    #[serde(rename = "Preset_2", skip_serializing_if = "Option::is_none")]
    pub preset_2: Option<i64>,
    #[serde(rename = "Preset_3", skip_serializing_if = "Option::is_none")]
    pub preset_3: Option<i64>,
    #[serde(rename = "Preset_4", skip_serializing_if = "Option::is_none")]
    pub preset_4: Option<i64>,
    #[serde(rename = "Wifi_SSID", skip_serializing_if = "Option::is_none")]
    pub wifi_ssid: Option<String>,
}

impl WireRecord for DeviceCharacteristics {
    fn apply_field(&mut self, key: &str, value: &Value) -> FieldUpdate {
        match key {
            "User_Id" => set_text(&mut self.user_id, value),
            "Device_Id" => set_text(&mut self.device_id, value),
            "Hw_Id" => set_text(&mut self.hw_id, value),
            "Hw_Version" => set_text(&mut self.hw_version, value),
            "Fw_Version" => set_text(&mut self.fw_version, value),
            "Fw_Timestamp" => set_text(&mut self.fw_timestamp, value),
            "Control_Mode" => set_mode(&mut self.control_mode, value),
            "Rgb_Mode" => set_mode(&mut self.rgb_mode, value),
            "Rgb_Color" => set_text(&mut self.rgb_color, value),
            "Buzzer_Volume" => set_int(&mut self.buzzer_volume, value),
            "Parental_Mode" => set_mode(&mut self.parental_mode, value),
            "Parental_Limit" => set_int(&mut self.parental_limit, value),
            "Preset_1" => set_int(&mut self.preset_1, value),
            "Preset_2" => set_int(&mut self.preset_2, value),
            "Preset_3" => set_int(&mut self.preset_3, value),
            "Preset_4" => set_int(&mut self.preset_4, value),
            "Wifi_SSID" => set_text(&mut self.wifi_ssid, value),
            _ => FieldUpdate::Unknown,
        }
    }
}

/// Live telemetry (`"Type": "Status"` payloads)
///
/// Temperatures are millidegrees Celsius, voltage is millivolts, power is decawatts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceStatus {
    #[serde(rename = "St", skip_serializing_if = "Option::is_none")]
    pub run_state: Option<String>,
    /// Millilitres per minute
    #[serde(rename = "Fl", skip_serializing_if = "Option::is_none")]
    pub water_flow: Option<i64>,
    #[serde(rename = "Vi", skip_serializing_if = "Option::is_none")]
    pub voltage: Option<i64>,
    #[serde(rename = "Ti", skip_serializing_if = "Option::is_none")]
    pub temperature_in: Option<i64>,
    #[serde(rename = "To", skip_serializing_if = "Option::is_none")]
    pub temperature_out: Option<i64>,
    #[serde(rename = "Ts", skip_serializing_if = "Option::is_none")]
    pub temperature_target: Option<i64>,
    #[serde(rename = "Ps", skip_serializing_if = "Option::is_none")]
    pub power_factor: Option<i64>,
    #[serde(rename = "De", skip_serializing_if = "Option::is_none")]
    pub power_demand: Option<i64>,
    #[serde(rename = "Pw", skip_serializing_if = "Option::is_none")]
    pub power: Option<i64>,
    #[serde(rename = "Hp", skip_serializing_if = "Option::is_none")]
    pub hp: Option<i64>,
    /// Seconds
    #[serde(rename = "Up", skip_serializing_if = "Option::is_none")]
    pub uptime: Option<i64>,
    #[serde(rename = "Pp", skip_serializing_if = "Option::is_none")]
    pub pp: Option<i64>,
    /// dB
    #[serde(rename = "Wi", skip_serializing_if = "Option::is_none")]
    pub wifi_signal: Option<i64>,
}

impl DeviceStatus {
    pub fn is_running(&self) -> bool {
        self.run_state.as_deref() == Some(RUN_STATE_RUNNING)
    }
}

impl WireRecord for DeviceStatus {
    fn apply_field(&mut self, key: &str, value: &Value) -> FieldUpdate {
        match key {
            "St" => set_text(&mut self.run_state, value),
            "Fl" => set_int(&mut self.water_flow, value),
            "Vi" => set_int(&mut self.voltage, value),
            "Ti" => set_int(&mut self.temperature_in, value),
            "To" => set_int(&mut self.temperature_out, value),
            "Ts" => set_int(&mut self.temperature_target, value),
            "Ps" => set_int(&mut self.power_factor, value),
            "De" => set_int(&mut self.power_demand, value),
            "Pw" => set_int(&mut self.power, value),
            "Hp" => set_int(&mut self.hp, value),
            "Up" => set_int(&mut self.uptime, value),
            "Pp" => set_int(&mut self.pp, value),
            "Wi" => set_int(&mut self.wifi_signal, value),
            _ => FieldUpdate::Unknown,
        }
    }
}

/// Everything known about the device, each half present once first observed
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    #[serde(rename = "chars", skip_serializing_if = "Option::is_none")]
    pub characteristics: Option<DeviceCharacteristics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<DeviceStatus>,
}

impl DeviceSnapshot {
    /// True iff a status exists and its run state is literally `RUN`
    pub fn is_running(&self) -> bool {
        self.status.as_ref().is_some_and(DeviceStatus::is_running)
    }

    pub fn device_id(&self) -> Option<&str> {
        self.characteristics
            .as_ref()
            .and_then(|chars| chars.device_id.as_deref())
    }
}
