//! Generic sensors extracted from power, tank, climate and water heater
//! status messages.
//!
//! One status message may yield several independent readings. Each reading
//! is keyed by `(instance, field group)` so a battery message produces
//! separate voltage, current and temperature sensors.

use serde::Serialize;

use crate::device::AttributeValue;
use crate::event::Fields;
use crate::fields::scalar_text;
use crate::instance::Instance;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorClass {
    Temperature,
    Voltage,
    Current,
    Frequency,
    PowerFactor,
    Battery,
    Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateClass {
    Measurement,
}

/// Physical system a reading belongs to, used to group readings into
/// presentation devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorGroup {
    Power,
    Tank,
    Climate,
    WaterHeater,
    Generic,
}

/// One extracted sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    /// Stable key: `<instance>_<suffix>`, or the bare instance for the
    /// generic fallback.
    pub key: String,
    pub unique_id: String,
    pub name: String,
    pub value: AttributeValue,
    pub unit: Option<String>,
    pub device_class: Option<SensorClass>,
    pub state_class: Option<StateClass>,
    pub group: SensorGroup,
}

/// One field of a message schema. `{i}` in templates is the instance,
/// `{tank}` the tank type.
struct FieldSpec {
    /// Alternative field names with their units, first present wins.
    sources: &'static [(&'static str, Option<&'static str>)],
    suffix: &'static str,
    unique_id: &'static str,
    name: &'static str,
    class: Option<SensorClass>,
    measurement: bool,
}

struct Schema {
    prefix: &'static str,
    group: SensorGroup,
    fields: &'static [FieldSpec],
}

const PERCENT: Option<&str> = Some("%");
const FAHRENHEIT: Option<&str> = Some("°F");
const CELSIUS: Option<&str> = Some("°C");
const VOLT: Option<&str> = Some("V");
const AMPERE: Option<&str> = Some("A");

const fn measured(
    sources: &'static [(&'static str, Option<&'static str>)],
    suffix: &'static str,
    unique_id: &'static str,
    name: &'static str,
    class: Option<SensorClass>,
) -> FieldSpec {
    FieldSpec {
        sources,
        suffix,
        unique_id,
        name,
        class,
        measurement: true,
    }
}

const fn textual(
    field: &'static [(&'static str, Option<&'static str>)],
    suffix: &'static str,
    unique_id: &'static str,
    name: &'static str,
) -> FieldSpec {
    FieldSpec {
        sources: field,
        suffix,
        unique_id,
        name,
        class: None,
        measurement: false,
    }
}

// Order matters: prefixes are matched top to bottom, first match wins.
const SCHEMAS: &[Schema] = &[
    Schema {
        prefix: "TANK_STATUS",
        group: SensorGroup::Tank,
        fields: &[measured(
            &[("relative level", PERCENT)],
            "tank_level",
            "rvc_sensor_{i}",
            "{tank} Tank Level",
            None,
        )],
    },
    Schema {
        prefix: "THERMOSTAT_AMBIENT_STATUS",
        group: SensorGroup::Climate,
        fields: &[measured(
            &[("ambient temp F", FAHRENHEIT), ("ambient temp", CELSIUS)],
            "ambient_temp",
            "rvc_thermostat_{i}_ambient",
            "Zone {i} Ambient Temperature",
            Some(SensorClass::Temperature),
        )],
    },
    Schema {
        prefix: "INVERTER_DC_STATUS",
        group: SensorGroup::Power,
        fields: &[
            measured(
                &[("dc voltage", VOLT)],
                "dc_voltage",
                "rvc_inverter_{i}_dc_voltage",
                "Inverter {i} DC Voltage",
                Some(SensorClass::Voltage),
            ),
            measured(
                &[("dc amperage", AMPERE)],
                "dc_current",
                "rvc_inverter_{i}_dc_current",
                "Inverter {i} DC Current",
                Some(SensorClass::Current),
            ),
        ],
    },
    Schema {
        prefix: "INVERTER_AC_STATUS",
        group: SensorGroup::Power,
        fields: &[measured(
            &[("frequency", Some("Hz"))],
            "ac_frequency",
            "rvc_inverter_{i}_ac_frequency",
            "Inverter {i} AC Frequency",
            Some(SensorClass::Frequency),
        )],
    },
    Schema {
        prefix: "INVERTER_TEMPERATURE_STATUS",
        group: SensorGroup::Power,
        fields: &[
            measured(
                &[("fet temperature", CELSIUS)],
                "fet_temp",
                "rvc_inverter_{i}_fet_temp",
                "Inverter {i} FET Temperature",
                Some(SensorClass::Temperature),
            ),
            measured(
                &[("transformer temperature", CELSIUS)],
                "transformer_temp",
                "rvc_inverter_{i}_transformer_temp",
                "Inverter {i} Transformer Temperature",
                Some(SensorClass::Temperature),
            ),
        ],
    },
    Schema {
        prefix: "AC_LOAD_STATUS",
        group: SensorGroup::Power,
        fields: &[measured(
            &[("operating status", PERCENT)],
            "ac_load",
            "rvc_ac_load_{i}",
            "AC Load {i}",
            Some(SensorClass::PowerFactor),
        )],
    },
    Schema {
        prefix: "CHARGER_STATUS",
        group: SensorGroup::Power,
        fields: &[textual(
            &[("operating state", None)],
            "charger_state",
            "rvc_charger_{i}_state",
            "Charger {i} State",
        )],
    },
    Schema {
        prefix: "DC_SOURCE_STATUS_1",
        group: SensorGroup::Power,
        fields: &[
            measured(
                &[("dc voltage", VOLT)],
                "battery_voltage",
                "rvc_battery_{i}_voltage",
                "Battery {i} Voltage",
                Some(SensorClass::Voltage),
            ),
            measured(
                &[("dc current", AMPERE)],
                "battery_current",
                "rvc_battery_{i}_current",
                "Battery {i} Current",
                Some(SensorClass::Current),
            ),
        ],
    },
    Schema {
        prefix: "DC_SOURCE_STATUS_2",
        group: SensorGroup::Power,
        fields: &[
            measured(
                &[("state of charge", PERCENT)],
                "battery_soc",
                "rvc_battery_{i}_soc",
                "Battery {i} State of Charge",
                Some(SensorClass::Battery),
            ),
            measured(
                &[("source temperature", CELSIUS)],
                "battery_temp",
                "rvc_battery_{i}_temperature",
                "Battery {i} Temperature",
                Some(SensorClass::Temperature),
            ),
            measured(
                &[("time remaining", Some("min"))],
                "battery_time_remaining",
                "rvc_battery_{i}_time_remaining",
                "Battery {i} Time Remaining",
                Some(SensorClass::Duration),
            ),
        ],
    },
    Schema {
        prefix: "DC_SOURCE_STATUS_3",
        group: SensorGroup::Power,
        fields: &[
            measured(
                &[("state of health", PERCENT)],
                "battery_soh",
                "rvc_battery_{i}_soh",
                "Battery {i} State of Health",
                None,
            ),
            measured(
                &[("capacity remaining", Some("Ah"))],
                "battery_capacity_remaining",
                "rvc_battery_{i}_capacity",
                "Battery {i} Capacity Remaining",
                None,
            ),
        ],
    },
    Schema {
        prefix: "WATERHEATER_STATUS",
        group: SensorGroup::WaterHeater,
        fields: &[
            measured(
                &[("water temperature F", FAHRENHEIT)],
                "water_heater_temp",
                "rvc_waterheater_{i}_temperature",
                "Water Heater {i} Temperature",
                Some(SensorClass::Temperature),
            ),
            textual(
                &[("operating modes definition", None)],
                "water_heater_mode",
                "rvc_waterheater_{i}_mode",
                "Water Heater {i} Mode",
            ),
            textual(
                &[("burner status definition", None)],
                "water_heater_burner",
                "rvc_waterheater_{i}_burner",
                "Water Heater {i} Burner",
            ),
            textual(
                &[("thermostat status definition", None)],
                "water_heater_thermostat",
                "rvc_waterheater_{i}_thermostat",
                "Water Heater {i} Thermostat",
            ),
            textual(
                &[("dc power failure status definition", None)],
                "water_heater_dc_power",
                "rvc_waterheater_{i}_dc_power",
                "Water Heater {i} DC Power",
            ),
            textual(
                &[("failure to ignite status definition", None)],
                "water_heater_ignite",
                "rvc_waterheater_{i}_ignite_status",
                "Water Heater {i} Ignite Status",
            ),
        ],
    },
];

/// Extract every reading carried by one sensor message.
///
/// Messages without a matching schema, or whose schema yields nothing, fall
/// back to a single generic reading when they carry a bare `value` field.
#[must_use]
pub fn extract_readings(name: &str, instance: &Instance, fields: &Fields) -> Vec<SensorReading> {
    let mut readings = Vec::new();
    if let Some(schema) = SCHEMAS.iter().find(|schema| name.starts_with(schema.prefix)) {
        let tank = fields
            .get("instance definition")
            .and_then(scalar_text)
            .map_or_else(|| "Tank".to_string(), |def| def.replace(" tank", ""));
        let render = |template: &str| {
            template
                .replace("{i}", instance.as_str())
                .replace("{tank}", &tank)
        };
        for spec in schema.fields {
            let Some((value, unit)) = spec
                .sources
                .iter()
                .find_map(|(field, unit)| fields.get(*field).map(|value| (value, *unit)))
            else {
                continue;
            };
            readings.push(SensorReading {
                key: format!("{instance}_{}", spec.suffix),
                unique_id: render(spec.unique_id),
                name: render(spec.name),
                value: AttributeValue::from(value),
                unit: unit.map(str::to_string),
                device_class: spec.class,
                state_class: spec.measurement.then_some(StateClass::Measurement),
                group: schema.group,
            });
        }
    }
    if readings.is_empty()
        && let Some(value) = fields.get("value")
    {
        readings.push(SensorReading {
            key: instance.to_string(),
            unique_id: format!("rvc_sensor_{instance}"),
            name: fields
                .get("name")
                .and_then(scalar_text)
                .unwrap_or_else(|| format!("RVC Sensor {instance}")),
            value: AttributeValue::from(value),
            unit: fields.get("unit").and_then(scalar_text),
            device_class: None,
            state_class: (!value.is_null()).then_some(StateClass::Measurement),
            group: SensorGroup::Generic,
        });
    }
    readings
}
