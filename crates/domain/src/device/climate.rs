//! Climate zones (air conditioner / thermostat).

use serde::{Deserialize, Serialize};

use crate::device::{DiagnosticUpdate, Diagnostics};
use crate::event::Fields;
use crate::fields::{Decoded, FieldReader, clamp_to_u8};

const CURRENT_TEMPERATURE: &[&str] = &["current_temperature", "ambient temp F", "ambient temp"];
const TARGET_TEMPERATURE: &str = "target_temperature";
const SETPOINT_COOL: &str = "setpoint temp cool F";
const SETPOINT_HEAT: &str = "setpoint temp heat F";
const HVAC_MODE: &[&str] = &["hvac_mode", "operating mode definition"];
const FAN_MODE: &[&str] = &["fan_mode", "fan mode definition"];
const FAN_SPEED: &[&str] = &["fan speed", "fan_speed"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    Off,
    Cool,
    Heat,
    Auto,
}

impl HvacMode {
    /// Case-insensitive match against the closed set of modes.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" => Some(Self::Off),
            "cool" => Some(Self::Cool),
            "heat" => Some(Self::Heat),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanMode {
    Auto,
    On,
}

impl FanMode {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "on" => Some(Self::On),
            _ => None,
        }
    }
}

/// Typed partial update decoded from a climate status message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClimateStatus {
    pub current_temperature: Option<f64>,
    pub target_temperature: Option<f64>,
    pub setpoint_cool: Option<f64>,
    pub setpoint_heat: Option<f64>,
    pub hvac_mode: Option<HvacMode>,
    pub fan_mode: Option<FanMode>,
    pub fan_speed: Option<u8>,
    pub diagnostics: DiagnosticUpdate,
}

impl ClimateStatus {
    #[must_use]
    pub fn decode(fields: &Fields) -> Decoded<Self> {
        let mut reader = FieldReader::new(fields);
        let current_temperature = reader.first_number(CURRENT_TEMPERATURE);
        let setpoint_cool = reader.number(SETPOINT_COOL);
        let setpoint_heat = reader.number(SETPOINT_HEAT);
        // Explicit target first, then the cool setpoint, then the heat setpoint.
        let target_temperature = if reader.has(TARGET_TEMPERATURE) {
            reader.number(TARGET_TEMPERATURE)
        } else if reader.has(SETPOINT_COOL) {
            setpoint_cool
        } else {
            setpoint_heat
        };
        let hvac_mode = reader
            .first_text(HVAC_MODE)
            .and_then(|mode| HvacMode::parse(&mode));
        let fan_mode = reader
            .first_text(FAN_MODE)
            .and_then(|mode| FanMode::parse(&mode));
        let fan_speed = reader
            .first_number(FAN_SPEED)
            .map(|speed| clamp_to_u8(speed, 255));
        let diagnostics = DiagnosticUpdate::decode(&reader);
        reader.finish(Self {
            current_temperature,
            target_temperature,
            setpoint_cool,
            setpoint_heat,
            hvac_mode,
            fan_mode,
            fan_speed,
            diagnostics,
        })
    }
}

/// What a thermostat confirmation compares before and after a burst.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SetpointView {
    pub setpoint_cool: Option<f64>,
    pub setpoint_heat: Option<f64>,
    pub fan_mode: Option<FanMode>,
    pub fan_speed: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClimateState {
    pub hvac_mode: HvacMode,
    pub current_temperature: Option<f64>,
    pub target_temperature: Option<f64>,
    pub setpoint_cool: Option<f64>,
    pub setpoint_heat: Option<f64>,
    pub fan_mode: Option<FanMode>,
    pub fan_speed: Option<u8>,
    pub diagnostics: Diagnostics,
}

impl Default for ClimateState {
    fn default() -> Self {
        Self {
            hvac_mode: HvacMode::Auto,
            current_temperature: None,
            target_temperature: None,
            setpoint_cool: None,
            setpoint_heat: None,
            fan_mode: None,
            fan_speed: None,
            diagnostics: Diagnostics::new(),
        }
    }
}

impl ClimateState {
    pub fn apply(&mut self, status: &ClimateStatus) {
        fn set<T: Copy>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }
        set(&mut self.current_temperature, status.current_temperature);
        set(&mut self.target_temperature, status.target_temperature);
        set(&mut self.setpoint_cool, status.setpoint_cool);
        set(&mut self.setpoint_heat, status.setpoint_heat);
        set(&mut self.fan_mode, status.fan_mode);
        set(&mut self.fan_speed, status.fan_speed);
        if let Some(mode) = status.hvac_mode {
            self.hvac_mode = mode;
        }
        status.diagnostics.apply(&mut self.diagnostics);
    }

    #[must_use]
    pub fn setpoints(&self) -> SetpointView {
        SetpointView {
            setpoint_cool: self.setpoint_cool,
            setpoint_heat: self.setpoint_heat,
            fan_mode: self.fan_mode,
            fan_speed: self.fan_speed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: serde_json::Value) -> Decoded<ClimateStatus> {
        ClimateStatus::decode(value.as_object().unwrap())
    }

    #[test]
    fn should_try_temperature_aliases_in_priority_order() {
        let status = decode(json!({"ambient temp": 21.0, "ambient temp F": 70.0})).update;
        assert_eq!(status.current_temperature, Some(70.0));
        let status = decode(json!({"current_temperature": 68, "ambient temp F": 70.0})).update;
        assert_eq!(status.current_temperature, Some(68.0));
    }

    #[test]
    fn should_use_cool_setpoint_as_target() {
        let status = decode(json!({"setpoint temp cool F": 72, "setpoint temp heat F": 65})).update;
        assert_eq!(status.target_temperature, Some(72.0));
        assert_eq!(status.setpoint_cool, Some(72.0));
        assert_eq!(status.setpoint_heat, Some(65.0));
    }

    #[test]
    fn should_match_hvac_mode_case_insensitively() {
        let mut state = ClimateState::default();
        state.apply(&decode(json!({"operating mode definition": "COOL"})).update);
        assert_eq!(state.hvac_mode, HvacMode::Cool);
    }

    #[test]
    fn should_ignore_unknown_hvac_mode() {
        let mut state = ClimateState::default();
        state.apply(&decode(json!({"hvac_mode": "heat"})).update);
        state.apply(&decode(json!({"hvac_mode": "dehumidify"})).update);
        assert_eq!(state.hvac_mode, HvacMode::Heat);
    }

    #[test]
    fn should_keep_unmentioned_fields() {
        let mut state = ClimateState::default();
        state.apply(&decode(json!({"ambient temp F": 70.5, "fan speed": 50})).update);
        state.apply(&decode(json!({"fan mode definition": "on"})).update);
        assert_eq!(state.current_temperature, Some(70.5));
        assert_eq!(state.fan_speed, Some(50));
        assert_eq!(state.fan_mode, Some(FanMode::On));
    }

    #[test]
    fn should_skip_malformed_temperature() {
        let mut state = ClimateState::default();
        state.apply(&decode(json!({"ambient temp F": 70.5})).update);
        let decoded = decode(json!({"ambient temp F": "n/a", "fan speed": 100}));
        assert_eq!(decoded.skipped, vec!["ambient temp F"]);
        state.apply(&decoded.update);
        assert_eq!(state.current_temperature, Some(70.5));
        assert_eq!(state.fan_speed, Some(100));
    }
}
