//! Classified bus events.
//!
//! A [`ClassifiedEvent`] is the typed, instance-addressed form of one raw
//! bus message. It is immutable once built and shared read-only between all
//! reducers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::instance::Instance;

/// Ordered JSON object carried by a status message.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Device family an event is addressed to, decided once by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Light,
    Climate,
    Lock,
    Cover,
    Sensor,
    DeviceTracker,
}

impl DeviceType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Climate => "climate",
            Self::Lock => "lock",
            Self::Cover => "cover",
            Self::Sensor => "sensor",
            Self::DeviceTracker => "device_tracker",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "light" => Ok(Self::Light),
            "climate" => Ok(Self::Climate),
            "lock" => Ok(Self::Lock),
            "cover" => Ok(Self::Cover),
            "sensor" => Ok(Self::Sensor),
            "device_tracker" => Ok(Self::DeviceTracker),
            other => Err(ValidationError::UnknownDeviceType(other.to_string())),
        }
    }
}

/// A raw message resolved to a device family and instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedEvent {
    device_type: DeviceType,
    instance: Instance,
    name: String,
    fields: Fields,
}

impl ClassifiedEvent {
    #[must_use]
    pub fn new(
        device_type: DeviceType,
        instance: Instance,
        name: impl Into<String>,
        fields: Fields,
    ) -> Self {
        Self {
            device_type,
            instance,
            name: name.into(),
            fields,
        }
    }

    #[must_use]
    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    #[must_use]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Message name (e.g. `DC_DIMMER_STATUS_3`), empty when the payload had none.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn fields(&self) -> &Fields {
        &self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn should_round_trip_device_type_names() {
        for device_type in [
            DeviceType::Light,
            DeviceType::Climate,
            DeviceType::Lock,
            DeviceType::Cover,
            DeviceType::Sensor,
            DeviceType::DeviceTracker,
        ] {
            assert_eq!(device_type.as_str().parse::<DeviceType>(), Ok(device_type));
        }
    }

    #[test]
    fn should_reject_unknown_device_type() {
        assert_eq!(
            "fan".parse::<DeviceType>(),
            Err(ValidationError::UnknownDeviceType("fan".to_string()))
        );
    }

    #[test]
    fn should_serialize_device_type_as_snake_case() {
        let json = serde_json::to_string(&DeviceType::DeviceTracker).unwrap();
        assert_eq!(json, "\"device_tracker\"");
    }

    #[test]
    fn should_preserve_field_order() {
        let fields = json!({"name": "X", "zeta": 1, "alpha": 2})
            .as_object()
            .cloned()
            .unwrap();
        let event = ClassifiedEvent::new(DeviceType::Sensor, Instance::from(1), "X", fields);
        let keys: Vec<_> = event.fields().keys().cloned().collect();
        assert_eq!(keys, vec!["name", "zeta", "alpha"]);
    }
}
