use std::collections::BTreeMap;

use rvc_domain::availability::AvailabilityPolicy;
use rvc_domain::device::tracker::{GpsFix, TrackerState};
use rvc_domain::device::{Device, DeviceSnapshot};
use rvc_domain::event::{ClassifiedEvent, DeviceType};
use rvc_domain::instance::Instance;
use rvc_domain::time::Timestamp;

use super::{Reduction, StateChange, observe};
use crate::config::RvcConfig;

fn snapshot(
    device: &Device<TrackerState>,
    policy: AvailabilityPolicy,
    at: Timestamp,
) -> DeviceSnapshot<TrackerState> {
    let mut snapshot = device.snapshot(policy, at);
    snapshot.available &= device.state.has_fix();
    snapshot
}

/// GPS trackers. A tracker is only available once it has reported a fix.
pub struct TrackerReducer {
    policy: AvailabilityPolicy,
    devices: BTreeMap<Instance, Device<TrackerState>>,
}

impl TrackerReducer {
    #[must_use]
    pub fn new(config: &RvcConfig) -> Self {
        Self {
            policy: config.availability_policy(),
            devices: BTreeMap::new(),
        }
    }

    pub fn handle(&mut self, event: &ClassifiedEvent, at: Timestamp) -> Reduction {
        if event.device_type() != DeviceType::DeviceTracker {
            return Reduction::default();
        }
        let instance = event.instance();
        let device = self.devices.entry(instance.clone()).or_insert_with(|| {
            tracing::info!(%instance, "discovered gps tracker");
            Device::new(instance.to_string(), "GPS", TrackerState::default())
        });
        let decoded = GpsFix::decode(event.fields());
        observe(device, self.policy, at, &decoded.skipped, |state| {
            state.apply(&decoded.update);
        });
        Reduction {
            changes: vec![StateChange::Tracker(snapshot(device, self.policy, at))],
            coercion_failures: decoded.skipped.len(),
        }
    }

    #[must_use]
    pub fn snapshots(&self, at: Timestamp) -> Vec<StateChange> {
        self.devices
            .values()
            .map(|device| StateChange::Tracker(snapshot(device, self.policy, at)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rvc_domain::event::Fields;
    use rvc_domain::time::now;
    use serde_json::json;

    fn tpv(fields: serde_json::Value) -> ClassifiedEvent {
        let fields: Fields = fields.as_object().cloned().unwrap();
        ClassifiedEvent::new(DeviceType::DeviceTracker, Instance::try_from("gps").unwrap(), "TPV", fields)
    }

    fn tracker(reduction: &Reduction) -> &DeviceSnapshot<TrackerState> {
        match &reduction.changes[0] {
            StateChange::Tracker(snapshot) => snapshot,
            other => panic!("expected tracker change, got {other:?}"),
        }
    }

    #[test]
    fn should_be_unavailable_without_fix() {
        let mut reducer = TrackerReducer::new(&RvcConfig::default());
        let reduction = reducer.handle(&tpv(json!({"class": "TPV", "mode": 1})), now());
        let snapshot = tracker(&reduction);
        assert!(!snapshot.available);
        assert_eq!(snapshot.state.gps_mode.as_deref(), Some("No Fix"));
    }

    #[test]
    fn should_become_available_with_fix() {
        let mut reducer = TrackerReducer::new(&RvcConfig::default());
        let reduction = reducer.handle(
            &tpv(json!({"class": "TPV", "mode": 3, "lat": 45.5, "lon": -122.6})),
            now(),
        );
        let snapshot = tracker(&reduction);
        assert!(snapshot.available);
        assert_eq!(snapshot.label, "GPS");
        assert_eq!(snapshot.state.latitude, Some(45.5));
    }

    #[test]
    fn should_keep_last_fix_when_position_is_missing() {
        let mut reducer = TrackerReducer::new(&RvcConfig::default());
        reducer.handle(&tpv(json!({"lat": 45.5, "lon": -122.6})), now());
        let reduction = reducer.handle(&tpv(json!({"alt": 12.0})), now());
        let snapshot = tracker(&reduction);
        assert!(snapshot.available);
        assert_eq!(snapshot.state.altitude_m, Some(12.0));
        assert_eq!(snapshot.state.longitude, Some(-122.6));
    }
}
