//! Raw message classification.
//!
//! Turns a transport message into at most one [`ClassifiedEvent`]:
//!
//! 1. topics containing the GPS marker become a `device_tracker` event;
//! 2. `<prefix>/status/<type>/<instance>` topics give type and instance;
//! 3. otherwise the payload `name` is matched against an ordered prefix table;
//! 4. the instance comes from the topic, else from the payload `instance`.
//!
//! Every attempt, successful or not, lands in the recent-messages buffer.

use rvc_domain::event::{ClassifiedEvent, DeviceType, Fields};
use rvc_domain::fields::scalar_text;
use rvc_domain::instance::Instance;

use crate::codec::{RawMessage, decode_payload};
use crate::diagnostics::{MessageSummary, RecentMessages};

/// Instance of the single GPS tracker.
pub const GPS_INSTANCE: &str = "gps";

// First match wins.
const NAME_PREFIXES: &[(&str, DeviceType)] = &[
    ("DC_DIMMER_STATUS", DeviceType::Light),
    ("AIR_CONDITIONER_STATUS", DeviceType::Climate),
    ("THERMOSTAT_STATUS_1", DeviceType::Climate),
    ("TANK_STATUS", DeviceType::Sensor),
    ("THERMOSTAT_AMBIENT_STATUS", DeviceType::Sensor),
    ("INVERTER_DC_STATUS", DeviceType::Sensor),
    ("INVERTER_AC_STATUS", DeviceType::Sensor),
    ("INVERTER_TEMPERATURE_STATUS", DeviceType::Sensor),
    ("AC_LOAD_STATUS", DeviceType::Sensor),
    ("CHARGER_STATUS", DeviceType::Sensor),
    ("DC_SOURCE_STATUS", DeviceType::Sensor),
    ("WATERHEATER_STATUS", DeviceType::Sensor),
    ("CIRCULATION_PUMP_STATUS", DeviceType::Sensor),
];

/// Device type for a message name, from the prefix table.
#[must_use]
pub fn type_from_name(name: &str) -> Option<DeviceType> {
    NAME_PREFIXES
        .iter()
        .find(|(prefix, _)| name.starts_with(prefix))
        .map(|(_, device_type)| *device_type)
}

pub struct Classifier {
    status_prefix: String,
    gps_marker: String,
    recent: RecentMessages,
    decode_failures: u64,
    misses: u64,
}

impl Classifier {
    #[must_use]
    pub fn new(topic_prefix: &str, gps_marker: impl Into<String>, recent_capacity: usize) -> Self {
        Self {
            status_prefix: format!("{topic_prefix}/status/"),
            gps_marker: gps_marker.into(),
            recent: RecentMessages::new(recent_capacity),
            decode_failures: 0,
            misses: 0,
        }
    }

    /// Classify one message. Never fails: undecodable payloads and
    /// unmatched messages yield `None` and are counted.
    pub fn classify(&mut self, message: &RawMessage) -> Option<ClassifiedEvent> {
        let fields = match decode_payload(&message.payload) {
            Ok(fields) => fields,
            Err(err) => {
                self.decode_failures += 1;
                tracing::warn!(topic = %message.topic, %err, "dropping undecodable payload");
                self.remember(&message.topic, None, Vec::new());
                return None;
            }
        };
        let field_names = fields.keys().cloned().collect();
        let event = self.resolve(&message.topic, fields);
        match &event {
            Some(event) => tracing::debug!(
                topic = %message.topic,
                device_type = %event.device_type(),
                instance = %event.instance(),
                name = event.name(),
                "classified message"
            ),
            None => {
                self.misses += 1;
                tracing::debug!(topic = %message.topic, "no device type or instance, dropping message");
            }
        }
        self.remember(&message.topic, event.as_ref(), field_names);
        event
    }

    fn resolve(&self, topic: &str, fields: Fields) -> Option<ClassifiedEvent> {
        if !self.gps_marker.is_empty() && topic.contains(&self.gps_marker) {
            let instance = Instance::new(GPS_INSTANCE).ok()?;
            return Some(ClassifiedEvent::new(DeviceType::DeviceTracker, instance, "GPS", fields));
        }

        let name = fields.get("name").and_then(scalar_text).unwrap_or_default();
        let (topic_type, topic_instance) = self.split_status_topic(topic);
        let instance = match topic_instance.filter(|instance| !instance.is_empty()) {
            Some(instance) => Instance::new(instance).ok()?,
            None => Instance::new(fields.get("instance").and_then(scalar_text)?).ok()?,
        };
        let device_type = topic_type
            .and_then(|t| t.parse::<DeviceType>().ok())
            .or_else(|| type_from_name(&name))?;
        Some(ClassifiedEvent::new(device_type, instance, name, fields))
    }

    fn split_status_topic<'t>(&self, topic: &'t str) -> (Option<&'t str>, Option<&'t str>) {
        let Some(rest) = topic.strip_prefix(&self.status_prefix) else {
            return (None, None);
        };
        let mut parts = rest.split('/');
        match (parts.next(), parts.next()) {
            (Some(device_type), Some(instance)) => (Some(device_type), Some(instance)),
            _ => (None, None),
        }
    }

    fn remember(&mut self, topic: &str, event: Option<&ClassifiedEvent>, field_names: Vec<String>) {
        self.recent.record(MessageSummary {
            topic: topic.to_string(),
            device_type: event.map(ClassifiedEvent::device_type),
            instance: event.map(|e| e.instance().to_string()),
            field_names,
        });
    }

    #[must_use]
    pub fn recent(&self) -> &RecentMessages {
        &self.recent
    }

    #[must_use]
    pub fn decode_failures(&self) -> u64 {
        self.decode_failures
    }

    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses
    }
}
