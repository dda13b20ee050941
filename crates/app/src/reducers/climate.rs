use std::collections::BTreeMap;

use rvc_domain::availability::AvailabilityPolicy;
use rvc_domain::device::Device;
use rvc_domain::device::climate::{ClimateState, ClimateStatus, SetpointView};
use rvc_domain::event::{ClassifiedEvent, DeviceType};
use rvc_domain::instance::Instance;
use rvc_domain::time::Timestamp;

use super::{Reduction, StateChange, observe};
use crate::config::RvcConfig;

/// Climate zones listed in the configuration.
pub struct ClimateReducer {
    policy: AvailabilityPolicy,
    devices: BTreeMap<Instance, Device<ClimateState>>,
}

impl ClimateReducer {
    #[must_use]
    pub fn new(config: &RvcConfig) -> Self {
        let devices = config
            .climate_zones
            .iter()
            .map(|(instance, label)| {
                (
                    instance.clone(),
                    Device::new(instance.to_string(), label.clone(), ClimateState::default()),
                )
            })
            .collect();
        Self {
            policy: config.availability_policy(),
            devices,
        }
    }

    pub fn handle(&mut self, event: &ClassifiedEvent, at: Timestamp) -> Reduction {
        if event.device_type() != DeviceType::Climate {
            return Reduction::default();
        }
        let Some(device) = self.devices.get_mut(event.instance()) else {
            tracing::debug!(instance = %event.instance(), "ignoring unconfigured climate zone");
            return Reduction::default();
        };
        let decoded = ClimateStatus::decode(event.fields());
        let snapshot = observe(device, self.policy, at, &decoded.skipped, |state| {
            state.apply(&decoded.update);
        });
        Reduction {
            changes: vec![StateChange::Climate(snapshot)],
            coercion_failures: decoded.skipped.len(),
        }
    }

    /// Current setpoints of a zone, the baseline of a signature confirmation.
    #[must_use]
    pub fn setpoints(&self, instance: &Instance) -> Option<SetpointView> {
        self.devices.get(instance).map(|device| device.state.setpoints())
    }

    #[must_use]
    pub fn snapshots(&self, at: Timestamp) -> Vec<StateChange> {
        self.devices
            .values()
            .map(|device| StateChange::Climate(device.snapshot(self.policy, at)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rvc_domain::device::climate::HvacMode;
    use rvc_domain::event::Fields;
    use rvc_domain::time::now;
    use serde_json::json;

    fn status(instance: u8, fields: serde_json::Value) -> ClassifiedEvent {
        let fields: Fields = fields.as_object().cloned().unwrap();
        ClassifiedEvent::new(
            DeviceType::Climate,
            Instance::from(instance),
            "THERMOSTAT_STATUS_1",
            fields,
        )
    }

    #[test]
    fn should_update_configured_zone() {
        let mut reducer = ClimateReducer::new(&RvcConfig::default());
        let reduction = reducer.handle(
            &status(1, json!({"operating mode definition": "Cool", "setpoint temp cool F": 72})),
            now(),
        );
        let StateChange::Climate(snapshot) = &reduction.changes[0] else {
            panic!("expected climate change");
        };
        assert_eq!(snapshot.state.hvac_mode, HvacMode::Cool);
        assert_eq!(snapshot.state.target_temperature, Some(72.0));
        assert_eq!(
            reducer.setpoints(&Instance::from(1)).and_then(|s| s.setpoint_cool),
            Some(72.0)
        );
    }

    #[test]
    fn should_ignore_unconfigured_zone() {
        let mut reducer = ClimateReducer::new(&RvcConfig::default());
        let reduction = reducer.handle(&status(9, json!({"hvac_mode": "heat"})), now());
        assert!(reduction.changes.is_empty());
        assert_eq!(reducer.snapshots(now()).len(), 3);
    }
}
