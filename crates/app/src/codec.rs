//! Wire codec: JSON payload decoding and outbound command encoding.

use serde::Serialize;
use serde_json::Value;

use rvc_domain::command::{CommandIntent, SignatureAction, ThermostatCommand};
use rvc_domain::event::Fields;
use rvc_domain::time::{Timestamp, bus_timestamp};

use crate::config::CommandFormat;

/// DGN of `DC_DIMMER_COMMAND_2`.
pub const DIMMER_COMMAND_DGN: &str = "1FEDB";
/// DGN of `THERMOSTAT_COMMAND_1`.
pub const THERMOSTAT_COMMAND_DGN: &str = "1FEF9";
/// DGN of absolute thermostat commands.
pub const THERMOSTAT_SETPOINT_DGN: &str = "1FFE2";

/// A message as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl RawMessage {
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// A message to hand to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is not valid JSON")]
    Json(#[source] serde_json::Error),

    #[error("payload is a JSON {0}, expected an object")]
    NotAnObject(&'static str),
}

/// Decode a status payload into its ordered field map.
///
/// # Errors
///
/// Fails when the payload is not JSON or not a JSON object.
pub fn decode_payload(payload: &[u8]) -> Result<Fields, DecodeError> {
    match serde_json::from_slice(payload).map_err(DecodeError::Json)? {
        Value::Object(fields) => Ok(fields),
        Value::Array(_) => Err(DecodeError::NotAnObject("array")),
        Value::String(_) => Err(DecodeError::NotAnObject("string")),
        Value::Number(_) => Err(DecodeError::NotAnObject("number")),
        Value::Bool(_) => Err(DecodeError::NotAnObject("boolean")),
        Value::Null => Err(DecodeError::NotAnObject("null")),
    }
}

/// Structured dimmer command, shaped like the bus's own status messages.
#[derive(Debug, Serialize)]
struct StructuredCommand {
    command: u8,
    #[serde(rename = "command definition")]
    command_definition: &'static str,
    data: String,
    #[serde(rename = "delay/duration")]
    delay_duration: u8,
    #[serde(rename = "desired level")]
    desired_level: u8,
    dgn: &'static str,
    group: &'static str,
    instance: u8,
    interlock: &'static str,
    #[serde(rename = "interlock definition")]
    interlock_definition: &'static str,
    name: &'static str,
    timestamp: String,
}

impl StructuredCommand {
    fn new(intent: &CommandIntent, at: Timestamp) -> Self {
        let code = intent.code().code();
        Self {
            command: code,
            command_definition: intent.code().definition(),
            data: format!(
                "{:02X}FF{:02X}{:02X}{:02X}00FFFF",
                intent.number(),
                intent.level(),
                code,
                intent.duration()
            ),
            delay_duration: intent.duration(),
            desired_level: intent.level(),
            dgn: DIMMER_COMMAND_DGN,
            group: "11111111",
            instance: intent.number(),
            interlock: "00",
            interlock_definition: "no interlock active",
            name: "DC_DIMMER_COMMAND_2",
            timestamp: bus_timestamp(at),
        }
    }
}

/// Thermostat command frame.
#[derive(Debug, Serialize)]
struct ThermostatFrame {
    name: &'static str,
    instance: u8,
    dgn: &'static str,
    data: String,
    timestamp: String,
}

/// Builds outbound messages for the configured wire format.
#[derive(Debug, Clone)]
pub struct CommandEncoder {
    format: CommandFormat,
    prefix: String,
    command_topic: String,
}

impl CommandEncoder {
    #[must_use]
    pub fn new(format: CommandFormat, prefix: impl Into<String>, command_topic: impl Into<String>) -> Self {
        Self {
            format,
            prefix: prefix.into(),
            command_topic: command_topic.into(),
        }
    }

    /// Encode a dimmer-style command.
    #[must_use]
    pub fn encode(&self, intent: &CommandIntent, at: Timestamp) -> OutboundMessage {
        match self.format {
            CommandFormat::Compact => OutboundMessage {
                topic: self.command_topic.clone(),
                payload: format!("{} {} {}", intent.number(), intent.code().code(), intent.level()),
            },
            CommandFormat::Structured => OutboundMessage {
                topic: format!("{}/DC_DIMMER_COMMAND_2/{}", self.prefix, intent.number()),
                payload: to_json(&StructuredCommand::new(intent, at)),
            },
        }
    }

    /// Encode one thermostat signature frame. Each frame of a burst is
    /// encoded afresh so it carries its own timestamp.
    #[must_use]
    pub fn encode_signature(&self, instance: u8, action: SignatureAction, at: Timestamp) -> OutboundMessage {
        let frame = ThermostatFrame {
            name: "THERMOSTAT_COMMAND_1",
            instance,
            dgn: THERMOSTAT_COMMAND_DGN,
            data: action.data(instance),
            timestamp: bus_timestamp(at),
        };
        OutboundMessage {
            topic: format!("{}/THERMOSTAT_COMMAND_1/{instance}", self.prefix),
            payload: to_json(&frame),
        }
    }

    /// Encode an absolute thermostat command, on the same topic as the
    /// signature frames.
    #[must_use]
    pub fn encode_thermostat(&self, command: &ThermostatCommand, at: Timestamp) -> OutboundMessage {
        let frame = ThermostatFrame {
            name: "THERMOSTAT_COMMAND_1",
            instance: command.instance,
            dgn: THERMOSTAT_SETPOINT_DGN,
            data: command.data(),
            timestamp: bus_timestamp(at),
        };
        OutboundMessage {
            topic: format!("{}/THERMOSTAT_COMMAND_1/{}", self.prefix, command.instance),
            payload: to_json(&frame),
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    // Plain structs of strings and integers always serialize.
    serde_json::to_string(value).unwrap_or_default()
}
