use std::collections::BTreeMap;

use rvc_domain::availability::AvailabilityPolicy;
use rvc_domain::device::Device;
use rvc_domain::device::sensor::{SensorReading, extract_readings};
use rvc_domain::event::{ClassifiedEvent, DeviceType};
use rvc_domain::time::Timestamp;

use super::{Reduction, StateChange, observe};
use crate::config::RvcConfig;

/// Sensor readings, created the first time a message carries them.
pub struct SensorReducer {
    policy: AvailabilityPolicy,
    devices: BTreeMap<String, Device<SensorReading>>,
}

impl SensorReducer {
    #[must_use]
    pub fn new(config: &RvcConfig) -> Self {
        Self {
            policy: config.availability_policy(),
            devices: BTreeMap::new(),
        }
    }

    pub fn handle(&mut self, event: &ClassifiedEvent, at: Timestamp) -> Reduction {
        if event.device_type() != DeviceType::Sensor {
            return Reduction::default();
        }
        let mut reduction = Reduction::default();
        for reading in extract_readings(event.name(), event.instance(), event.fields()) {
            let device = self.devices.entry(reading.key.clone()).or_insert_with(|| {
                tracing::info!(key = %reading.key, name = %reading.name, "discovered sensor");
                Device::new(reading.key.clone(), reading.name.clone(), reading.clone())
            });
            let snapshot = observe(device, self.policy, at, &[], |state| *state = reading);
            reduction.changes.push(StateChange::Sensor(snapshot));
        }
        reduction
    }

    #[must_use]
    pub fn snapshots(&self, at: Timestamp) -> Vec<StateChange> {
        self.devices
            .values()
            .map(|device| StateChange::Sensor(device.snapshot(self.policy, at)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rvc_domain::device::attribute_value::AttributeValue;
    use rvc_domain::event::Fields;
    use rvc_domain::instance::Instance;
    use rvc_domain::time::now;
    use serde_json::json;

    fn event(name: &str, instance: u8, fields: serde_json::Value) -> ClassifiedEvent {
        let fields: Fields = fields.as_object().cloned().unwrap();
        ClassifiedEvent::new(DeviceType::Sensor, Instance::from(instance), name, fields)
    }

    #[test]
    fn should_start_empty() {
        let reducer = SensorReducer::new(&RvcConfig::default());
        assert!(reducer.snapshots(now()).is_empty());
    }

    #[test]
    fn should_emit_one_change_per_reading() {
        let mut reducer = SensorReducer::new(&RvcConfig::default());
        let message = json!({"state of charge": 87, "source temperature": 21.5});
        let reduction = reducer.handle(&event("DC_SOURCE_STATUS_2", 1, message), now());
        assert_eq!(reduction.changes.len(), 2);
        assert_eq!(reducer.snapshots(now()).len(), 2);
    }

    #[test]
    fn should_update_existing_reading() {
        let mut reducer = SensorReducer::new(&RvcConfig::default());
        reducer.handle(&event("DC_SOURCE_STATUS_2", 1, json!({"state of charge": 87})), now());
        let reduction = reducer.handle(&event("DC_SOURCE_STATUS_2", 1, json!({"state of charge": 85})), now());
        let StateChange::Sensor(snapshot) = &reduction.changes[0] else {
            panic!("expected sensor change");
        };
        assert_eq!(snapshot.key, "1_battery_soc");
        assert_eq!(snapshot.state.value, AttributeValue::from(&json!(85)));
        assert_eq!(reducer.snapshots(now()).len(), 1);
    }

    #[test]
    fn should_ignore_messages_without_readings() {
        let mut reducer = SensorReducer::new(&RvcConfig::default());
        let reduction = reducer.handle(&event("UNKNOWN_STATUS", 3, json!({"foo": 1})), now());
        assert!(reduction.changes.is_empty());
    }
}
