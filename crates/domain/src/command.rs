//! Outbound command vocabulary.
//!
//! Dimmer-style loads take absolute commands ([`CommandIntent`]). Thermostats
//! take either relative "learned signature" frames ([`SignatureAction`]) or
//! an absolute mode and setpoint frame ([`ThermostatCommand`]). Thermostat
//! requests are validated before publishing and rejected with a [`Nack`].

use std::fmt;
use std::fmt::Write as _;
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};

use crate::device::climate::{FanMode, SetpointView};
use crate::error::ValidationError;
use crate::instance::Instance;
use crate::time::{Timestamp, epoch_secs};

/// Duration byte meaning "no delay / no duration".
pub const NO_DURATION: u8 = 255;
/// Ramp duration used by ramp up/down commands, in seconds.
pub const RAMP_DURATION: u8 = 5;
/// PGN of the absolute thermostat command frame.
pub const THERMOSTAT_COMMAND_PGN: u32 = 0x1_FFE2;

/// Accepted Fahrenheit setpoints.
const SETPOINT_RANGE_F: RangeInclusive<f64> = 50.0..=95.0;
const DEFAULT_SETPOINT_F: f64 = 72.0;
const DEFAULT_FAN_SPEED: f64 = 50.0;
const MAX_FAN_SPEED: f64 = 100.0;
const MAX_MODE: u8 = 4;
const MAX_FAN_MODE: u8 = 1;

/// Dimmer command codes understood by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum CommandCode {
    SetLevel,
    On,
    Off,
    Toggle,
    RampUp,
    RampDown,
}

impl CommandCode {
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::SetLevel => 0,
            Self::On => 2,
            Self::Off => 3,
            Self::Toggle => 5,
            Self::RampUp => 19,
            Self::RampDown => 20,
        }
    }

    /// Human-readable name mirrored in structured command frames.
    #[must_use]
    pub const fn definition(self) -> &'static str {
        match self {
            Self::SetLevel => "set brightness",
            Self::On => "on delay",
            Self::Off => "off",
            Self::Toggle => "toggle",
            Self::RampUp => "ramp up",
            Self::RampDown => "ramp down",
        }
    }
}

impl From<CommandCode> for u8 {
    fn from(value: CommandCode) -> Self {
        value.code()
    }
}

impl TryFrom<u8> for CommandCode {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::SetLevel),
            2 => Ok(Self::On),
            3 => Ok(Self::Off),
            5 => Ok(Self::Toggle),
            19 => Ok(Self::RampUp),
            20 => Ok(Self::RampDown),
            _ => Err(ValidationError::OutOfRange {
                field: "command",
                constraint: "one of 0, 2, 3, 5, 19, 20",
            }),
        }
    }
}

/// An absolute command for one dimmer-style instance.
///
/// Construction validates the instance number, so an intent can always be
/// encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandIntent {
    instance: Instance,
    number: u8,
    code: CommandCode,
    level: u8,
    duration: u8,
}

impl CommandIntent {
    /// # Errors
    ///
    /// Returns an error when the instance is not numeric or the level is
    /// above 100.
    pub fn new(instance: &Instance, code: CommandCode, level: u8) -> Result<Self, ValidationError> {
        if level > 100 {
            return Err(ValidationError::OutOfRange {
                field: "level",
                constraint: "between 0 and 100",
            });
        }
        let duration = match code {
            CommandCode::RampUp | CommandCode::RampDown => RAMP_DURATION,
            _ => NO_DURATION,
        };
        Ok(Self {
            number: instance.number()?,
            instance: instance.clone(),
            code,
            level,
            duration,
        })
    }

    /// Switch on at `level`.
    ///
    /// # Errors
    ///
    /// See [`CommandIntent::new`].
    pub fn on(instance: &Instance, level: u8) -> Result<Self, ValidationError> {
        Self::new(instance, CommandCode::On, level)
    }

    /// Switch off.
    ///
    /// # Errors
    ///
    /// See [`CommandIntent::new`].
    pub fn off(instance: &Instance) -> Result<Self, ValidationError> {
        Self::new(instance, CommandCode::Off, 0)
    }

    /// Full-level pulse used by momentary relays (locks, awnings, buttons).
    ///
    /// # Errors
    ///
    /// See [`CommandIntent::new`].
    pub fn pulse(instance: &Instance, code: CommandCode) -> Result<Self, ValidationError> {
        Self::new(instance, code, 100)
    }

    #[must_use]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    #[must_use]
    pub fn number(&self) -> u8 {
        self.number
    }

    #[must_use]
    pub fn code(&self) -> CommandCode {
        self.code
    }

    #[must_use]
    pub fn level(&self) -> u8 {
        self.level
    }

    #[must_use]
    pub fn duration(&self) -> u8 {
        self.duration
    }
}

/// Relative thermostat adjustment replayed as a fixed signature frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureAction {
    TempUp,
    TempDown,
    FanHigh,
    FanLow,
    FanAuto,
}

impl SignatureAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TempUp => "temp_up",
            Self::TempDown => "temp_down",
            Self::FanHigh => "fan_high",
            Self::FanLow => "fan_low",
            Self::FanAuto => "fan_auto",
        }
    }

    /// The seven bytes following the instance byte.
    const fn tail(self) -> &'static str {
        match self {
            Self::TempUp => "FFFFFFFFFAFFFF",
            Self::TempDown => "FFFFFFFFF9FFFF",
            Self::FanHigh => "DFC8FFFFFFFFFF",
            Self::FanLow => "DF64FFFFFFFFFF",
            Self::FanAuto => "CFFFFFFFFFFFFF",
        }
    }

    /// Eight-byte frame data as uppercase hex, instance in byte 0.
    #[must_use]
    pub fn data(self, instance: u8) -> String {
        format!("{instance:02X}{}", self.tail())
    }

    /// Whether `observed` reflects this action relative to `baseline`.
    ///
    /// Temperature actions need the cool or heat setpoint to move in the
    /// requested direction. Fan actions need the reported fan mode and
    /// speed to match the target.
    #[must_use]
    pub fn is_confirmed_by(self, baseline: &SetpointView, observed: &SetpointView) -> bool {
        fn moved(before: Option<f64>, after: Option<f64>, up: bool) -> bool {
            match (before, after) {
                (Some(before), Some(after)) if up => after > before,
                (Some(before), Some(after)) => after < before,
                _ => false,
            }
        }
        match self {
            Self::TempUp | Self::TempDown => {
                let up = self == Self::TempUp;
                moved(baseline.setpoint_cool, observed.setpoint_cool, up)
                    || moved(baseline.setpoint_heat, observed.setpoint_heat, up)
            }
            Self::FanHigh => observed.fan_mode == Some(FanMode::On) && observed.fan_speed == Some(100),
            Self::FanLow => observed.fan_mode == Some(FanMode::On) && observed.fan_speed == Some(50),
            Self::FanAuto => observed.fan_mode == Some(FanMode::Auto),
        }
    }
}

impl fmt::Display for SignatureAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureAction {
    type Err = NackReason;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "temp_up" => Ok(Self::TempUp),
            "temp_down" => Ok(Self::TempDown),
            "fan_high" => Ok(Self::FanHigh),
            "fan_low" => Ok(Self::FanLow),
            "fan_auto" => Ok(Self::FanAuto),
            other => Err(NackReason::BadAction(other.to_string())),
        }
    }
}

/// Absolute thermostat request. Every field is optional.
///
/// `setpoint_f` sets both setpoints unless a heat or cool value is given.
/// Celsius setpoints win over Fahrenheit ones when both are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermostatRequest {
    pub mode: Option<i64>,
    pub fan_mode: Option<i64>,
    pub schedule_mode: Option<i64>,
    pub fan_speed: Option<f64>,
    pub setpoint_f: Option<f64>,
    pub setpoint_heat_f: Option<f64>,
    pub setpoint_cool_f: Option<f64>,
    pub setpoint_heat_c: Option<f64>,
    pub setpoint_cool_c: Option<f64>,
}

impl ThermostatRequest {
    /// Validate the request and fill in defaults for zone `instance`.
    ///
    /// Defaults are cool mode, automatic fan at 50% and 72°F setpoints.
    ///
    /// # Errors
    ///
    /// Returns the reason for the first invalid field, checked in the order
    /// mode, fan mode, fan speed, heat setpoint, cool setpoint.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn resolve(&self, instance: u8) -> Result<ThermostatCommand, NackReason> {
        let mode = bounded(self.mode, 1, MAX_MODE, NackReason::BadMode)?;
        let fan_mode = bounded(self.fan_mode, 0, MAX_FAN_MODE, NackReason::BadFanMode)?;
        let fan_speed = self.fan_speed.unwrap_or(DEFAULT_FAN_SPEED);
        if !(0.0..=MAX_FAN_SPEED).contains(&fan_speed.trunc()) {
            return Err(NackReason::BadFanSpeed(fan_speed.to_string()));
        }
        let heat_f = self.setpoint_heat_f.or(self.setpoint_f);
        let cool_f = self.setpoint_cool_f.or(self.setpoint_f);
        if let Some(heat) = heat_f.filter(|heat| !SETPOINT_RANGE_F.contains(heat)) {
            return Err(NackReason::BadSetpointHeatF(heat.to_string()));
        }
        if let Some(cool) = cool_f.filter(|cool| !SETPOINT_RANGE_F.contains(cool)) {
            return Err(NackReason::BadSetpointCoolF(cool.to_string()));
        }
        Ok(ThermostatCommand {
            instance,
            mode,
            fan_mode,
            schedule_mode: self
                .schedule_mode
                .and_then(|schedule| u8::try_from(schedule & 0x03).ok())
                .unwrap_or(0),
            fan_speed: fan_speed.trunc() as u8,
            setpoint_heat_c100: centi_celsius(self.setpoint_heat_c, heat_f),
            setpoint_cool_c100: centi_celsius(self.setpoint_cool_c, cool_f),
        })
    }
}

fn bounded(value: Option<i64>, default: u8, max: u8, reason: fn(String) -> NackReason) -> Result<u8, NackReason> {
    value.map_or(Ok(default), |value| {
        u8::try_from(value)
            .ok()
            .filter(|value| *value <= max)
            .ok_or_else(|| reason(value.to_string()))
    })
}

#[allow(clippy::cast_possible_truncation)]
fn centi_celsius(celsius: Option<f64>, fahrenheit: Option<f64>) -> i32 {
    let celsius = celsius.unwrap_or_else(|| (fahrenheit.unwrap_or(DEFAULT_SETPOINT_F) - 32.0) * 5.0 / 9.0);
    (celsius * 100.0).round() as i32
}

/// A validated absolute thermostat command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThermostatCommand {
    pub instance: u8,
    /// 0 off, 1 cool, 2 heat, 3 auto, 4 fan only.
    pub mode: u8,
    /// 0 auto, 1 on.
    pub fan_mode: u8,
    pub schedule_mode: u8,
    /// Percent.
    pub fan_speed: u8,
    /// Hundredths of a degree Celsius.
    pub setpoint_heat_c100: i32,
    pub setpoint_cool_c100: i32,
}

impl ThermostatCommand {
    /// Eight-byte frame: instance, packed modes, fan speed, then the heat
    /// and cool setpoints little-endian.
    #[must_use]
    pub fn bytes(&self) -> [u8; 8] {
        let [heat_lo, heat_hi, ..] = self.setpoint_heat_c100.to_le_bytes();
        let [cool_lo, cool_hi, ..] = self.setpoint_cool_c100.to_le_bytes();
        let modes = (self.mode & 0x0F) | ((self.fan_mode & 0x03) << 4) | ((self.schedule_mode & 0x03) << 6);
        [self.instance, modes, self.fan_speed, heat_lo, heat_hi, cool_lo, cool_hi, 0xFF]
    }

    /// Frame data as uppercase hex.
    #[must_use]
    pub fn data(&self) -> String {
        self.bytes().iter().fold(String::with_capacity(16), |mut hex, byte| {
            let _ = write!(hex, "{byte:02X}");
            hex
        })
    }
}

/// Why a thermostat request was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NackReason {
    BadInstance(String),
    InstanceOutOfRange(u8),
    RateLimited(u8),
    BadAction(String),
    BadMode(String),
    BadFanMode(String),
    BadFanSpeed(String),
    BadSetpointHeatF(String),
    BadSetpointCoolF(String),
    InvalidJson,
}

impl fmt::Display for NackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadInstance(instance) => write!(f, "bad_instance:{instance}"),
            Self::InstanceOutOfRange(instance) => write!(f, "instance_out_of_range:{instance}"),
            Self::RateLimited(instance) => write!(f, "rate_limited:{instance}"),
            Self::BadAction(action) => write!(f, "bad_action:{action}"),
            Self::BadMode(mode) => write!(f, "bad_mode:{mode}"),
            Self::BadFanMode(mode) => write!(f, "bad_fan_mode:{mode}"),
            Self::BadFanSpeed(speed) => write!(f, "bad_fan_speed:{speed}"),
            Self::BadSetpointHeatF(setpoint) => write!(f, "bad_setpoint_heat_f:{setpoint}"),
            Self::BadSetpointCoolF(setpoint) => write!(f, "bad_setpoint_cool_f:{setpoint}"),
            Self::InvalidJson => f.write_str("invalid_json"),
        }
    }
}

impl Serialize for NackReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Structured negative acknowledgement for a rejected command.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("{reason}")]
pub struct Nack {
    status: &'static str,
    pub reason: NackReason,
    pub instance: String,
    pub ts: f64,
}

impl Nack {
    #[must_use]
    pub fn new(reason: NackReason, instance: impl Into<String>, at: Timestamp) -> Self {
        Self {
            status: "nack",
            reason,
            instance: instance.into(),
            ts: epoch_secs(at),
        }
    }
}
