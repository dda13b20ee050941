use std::collections::BTreeMap;

use rvc_domain::availability::AvailabilityPolicy;
use rvc_domain::command::{CommandCode, CommandIntent};
use rvc_domain::device::Device;
use rvc_domain::device::cover::{CoverDefinition, CoverKind, CoverRole, CoverState};
use rvc_domain::device::light::DimmerStatus;
use rvc_domain::error::{NotFoundError, RvcError, ValidationError};
use rvc_domain::event::{ClassifiedEvent, DeviceType};
use rvc_domain::time::Timestamp;

use super::{Reduction, StateChange, observe};
use crate::config::RvcConfig;

/// Awnings and slides. Each motor is driven through momentary extend,
/// retract and, for some awnings, stop relays.
pub struct CoverReducer {
    definitions: Vec<CoverDefinition>,
    policy: AvailabilityPolicy,
    devices: BTreeMap<String, Device<CoverState>>,
}

impl CoverReducer {
    #[must_use]
    pub fn new(config: &RvcConfig) -> Self {
        let devices = config
            .covers
            .iter()
            .map(|def| {
                (
                    def.id.clone(),
                    Device::new(def.id.clone(), def.name.clone(), CoverState::default()),
                )
            })
            .collect();
        Self {
            definitions: config.covers.clone(),
            policy: config.availability_policy(),
            devices,
        }
    }

    pub fn handle(&mut self, event: &ClassifiedEvent, at: Timestamp) -> Reduction {
        if event.device_type() != DeviceType::Light {
            return Reduction::default();
        }
        let Some((id, role)) = self
            .definitions
            .iter()
            .find_map(|def| def.role_of(event.instance()).map(|role| (&def.id, role)))
        else {
            return Reduction::default();
        };
        let Some(device) = self.devices.get_mut(id) else {
            return Reduction::default();
        };
        let decoded = DimmerStatus::decode(event.fields());
        let snapshot = observe(device, self.policy, at, &decoded.skipped, |state| {
            state.apply(role, &decoded.update);
        });
        Reduction {
            changes: vec![StateChange::Cover(snapshot)],
            coercion_failures: decoded.skipped.len(),
        }
    }

    /// # Errors
    ///
    /// Fails for unknown covers.
    pub fn open(&mut self, id: &str, at: Timestamp) -> Result<(CommandIntent, StateChange), RvcError> {
        self.actuate(id, CoverRole::Extend, at)
    }

    /// # Errors
    ///
    /// Fails for unknown covers.
    pub fn close(&mut self, id: &str, at: Timestamp) -> Result<(CommandIntent, StateChange), RvcError> {
        self.actuate(id, CoverRole::Retract, at)
    }

    /// # Errors
    ///
    /// Fails for unknown covers and for covers without a stop relay.
    pub fn stop(&mut self, id: &str, at: Timestamp) -> Result<(CommandIntent, StateChange), RvcError> {
        self.actuate(id, CoverRole::Stop, at)
    }

    fn actuate(
        &mut self,
        id: &str,
        role: CoverRole,
        at: Timestamp,
    ) -> Result<(CommandIntent, StateChange), RvcError> {
        let def = self
            .definitions
            .iter()
            .find(|def| def.id == id)
            .ok_or_else(|| NotFoundError::new("cover", id))?;
        let relay = match role {
            CoverRole::Extend => &def.extend,
            CoverRole::Retract => &def.retract,
            CoverRole::Stop => def
                .stop
                .as_ref()
                .ok_or_else(|| ValidationError::NoStopInstance(id.to_string()))?,
        };
        let intent = CommandIntent::pulse(relay, CommandCode::On)?;
        if def.kind == CoverKind::Slide && role != CoverRole::Stop {
            tracing::warn!(cover = id, ?role, "moving slide, ensure area is clear");
        }
        let device = self
            .devices
            .get_mut(id)
            .ok_or_else(|| NotFoundError::new("cover", id))?;
        match role {
            CoverRole::Extend => device.state.open(),
            CoverRole::Retract => device.state.close(),
            CoverRole::Stop => device.state.stop(),
        }
        tracing::info!(cover = id, instance = %relay, ?role, "actuating cover");
        Ok((intent, StateChange::Cover(device.snapshot(self.policy, at))))
    }

    #[must_use]
    pub fn snapshots(&self, at: Timestamp) -> Vec<StateChange> {
        self.devices
            .values()
            .map(|device| StateChange::Cover(device.snapshot(self.policy, at)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rvc_domain::device::DeviceSnapshot;
    use rvc_domain::event::Fields;
    use rvc_domain::instance::Instance;
    use rvc_domain::time::now;
    use serde_json::json;

    fn relay(instance: u8, level: u8) -> ClassifiedEvent {
        let fields: Fields = json!({"operating status (brightness)": level})
            .as_object()
            .cloned()
            .unwrap();
        ClassifiedEvent::new(DeviceType::Light, Instance::from(instance), "DC_DIMMER_STATUS_3", fields)
    }

    fn cover(change: &StateChange) -> &DeviceSnapshot<CoverState> {
        match change {
            StateChange::Cover(snapshot) => snapshot,
            other => panic!("expected cover change, got {other:?}"),
        }
    }

    #[test]
    fn should_create_every_configured_cover() {
        let reducer = CoverReducer::new(&RvcConfig::default());
        assert_eq!(reducer.snapshots(now()).len(), 7);
    }

    #[test]
    fn should_track_extend_and_retract_relays() {
        let mut reducer = CoverReducer::new(&RvcConfig::default());
        let reduction = reducer.handle(&relay(19, 100), now());
        let snapshot = cover(&reduction.changes[0]);
        assert_eq!(snapshot.key, "rear_awning");
        assert!(snapshot.state.is_opening);
        assert!(!snapshot.state.is_closed);

        reducer.handle(&relay(19, 0), now());
        let reduction = reducer.handle(&relay(20, 100), now());
        assert!(cover(&reduction.changes[0]).state.is_closing);
        let reduction = reducer.handle(&relay(20, 0), now());
        assert!(cover(&reduction.changes[0]).state.is_closed);
    }

    #[test]
    fn should_pulse_relays_for_actions() {
        let mut reducer = CoverReducer::new(&RvcConfig::default());
        let (intent, change) = reducer.open("kitchen_slide", now()).unwrap();
        assert_eq!(intent.instance(), &Instance::from(181));
        assert_eq!((intent.code(), intent.level()), (CommandCode::On, 100));
        assert!(cover(&change).state.is_opening);

        let (intent, _) = reducer.close("kitchen_slide", now()).unwrap();
        assert_eq!(intent.instance(), &Instance::from(182));

        let (intent, change) = reducer.stop("front_awning", now()).unwrap();
        assert_eq!(intent.instance(), &Instance::from(24));
        assert!(!cover(&change).state.is_opening);
    }

    #[test]
    fn should_reject_stop_without_stop_relay() {
        let mut reducer = CoverReducer::new(&RvcConfig::default());
        let result = reducer.stop("door_awning", now());
        assert!(matches!(
            result,
            Err(RvcError::Validation(ValidationError::NoStopInstance(id))) if id == "door_awning"
        ));
    }

    #[test]
    fn should_reject_unknown_cover() {
        let mut reducer = CoverReducer::new(&RvcConfig::default());
        assert!(matches!(reducer.open("patio", now()), Err(RvcError::NotFound(_))));
    }
}
